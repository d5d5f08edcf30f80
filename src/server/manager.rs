//! The crypto manager of a single environment.

use std::sync::Arc;
use log::{debug, info};
use crate::api::kmip::{
    ClusterId, ClusterSelector, ClusterStatus, CryptoKeyId, EntityRef,
    KmipClusterInfo, KmipServerSpec, ManagementType,
    ServerStatus,
};
use crate::commons::{KmipEmptyResult, KmipResult};
use crate::commons::error::Error;
use crate::config::Config;
use super::keys::KeyLedger;
use super::registry::ProviderRegistry;
use super::runtime::{Task, TaskRunner};
use super::status::StatusQuery;


//------------ CryptoManager -------------------------------------------------

/// Manages key providers and the keys generated with them.
///
/// This is the entry point for all operations. It owns the provider
/// registry and the key ledger of one environment and uses a task runner
/// for status queries. Create one per environment, e.g. per test, and drop
/// it when done.
#[derive(Debug)]
pub struct CryptoManager {
    registry: Arc<ProviderRegistry>,
    keys: KeyLedger,
    tasks: TaskRunner,
}

impl CryptoManager {
    /// Creates an empty manager using the given task runner.
    pub fn new(tasks: TaskRunner) -> Self {
        let registry = Arc::new(ProviderRegistry::new());
        CryptoManager {
            keys: KeyLedger::new(registry.clone()),
            registry,
            tasks,
        }
    }

    /// Creates a manager with the providers defined in the config.
    ///
    /// The providers are registered in the order they are listed, then
    /// their servers and finally the default assignments.
    pub fn from_config(config: &Config, tasks: TaskRunner) -> KmipResult<Self> {
        let manager = Self::new(tasks);
        for provider in &config.providers {
            manager.register_cluster(
                provider.cluster_id.clone(),
                provider.management_type.clone(),
            )?;
            for server in &provider.servers {
                manager.register_server(KmipServerSpec::new(
                    provider.cluster_id.clone(), server.clone()
                ))?;
            }
            if provider.default {
                manager.mark_default(&provider.cluster_id)?;
            }
            for entity in &provider.entity_defaults {
                manager.set_default(Some(&provider.cluster_id), Some(entity))?;
            }
        }
        info!(
            "Crypto manager started with {} provider(s)",
            config.providers.len()
        );
        Ok(manager)
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn keys(&self) -> &KeyLedger {
        &self.keys
    }
}

/// # Providers and servers
///
impl CryptoManager {
    pub fn list_clusters(&self, limit: Option<i32>) -> Vec<KmipClusterInfo> {
        self.registry.list_clusters(limit)
    }

    pub fn register_cluster(
        &self, cluster_id: ClusterId, management_type: ManagementType
    ) -> KmipEmptyResult {
        self.registry.register_cluster(cluster_id, management_type)
    }

    pub fn unregister_cluster(&self, cluster_id: &ClusterId) -> KmipEmptyResult {
        self.registry.unregister_cluster(cluster_id)
    }

    pub fn register_server(&self, spec: KmipServerSpec) -> KmipEmptyResult {
        self.registry.register_server(spec)
    }

    pub fn update_server(&self, spec: KmipServerSpec) -> KmipEmptyResult {
        self.registry.update_server(spec)
    }

    pub fn remove_server(
        &self, cluster_id: &ClusterId, server_name: &str
    ) -> KmipEmptyResult {
        self.registry.remove_server(cluster_id, server_name)
    }

    pub fn is_valid_provider(&self, cluster_id: &ClusterId) -> bool {
        self.list_clusters(None).iter().any(|c| &c.cluster_id == cluster_id)
    }

    pub fn is_valid_server(
        &self, cluster_id: &ClusterId, server_name: &str
    ) -> bool {
        self.list_clusters(None).iter().any(|c| {
            &c.cluster_id == cluster_id && c.has_server(server_name)
        })
    }
}

/// # Default providers
///
impl CryptoManager {
    pub fn get_default_cluster_id(
        &self, entity: Option<&EntityRef>, defaults_to_parent: bool
    ) -> KmipResult<ClusterId> {
        self.registry.get_default_cluster_id(entity, defaults_to_parent)
    }

    pub fn set_default(
        &self, cluster_id: Option<&ClusterId>, entity: Option<&EntityRef>
    ) -> KmipEmptyResult {
        self.registry.set_default(cluster_id, entity)
    }

    pub fn mark_default(&self, cluster_id: &ClusterId) -> KmipEmptyResult {
        self.registry.mark_default(cluster_id)
    }

    /// Returns whether the given provider is a native provider.
    ///
    /// Fails with [`Error::InvalidClusterId`] if the provider is unknown.
    pub async fn is_native_provider(
        &self, cluster_id: &ClusterId
    ) -> KmipResult<bool> {
        let status = self.get_cluster_status(cluster_id).await?;
        Ok(status.management_type.is_native())
    }

    /// Returns whether the default provider is a native provider.
    pub async fn is_default_provider_native(
        &self, entity: Option<&EntityRef>, defaults_to_parent: bool
    ) -> KmipResult<bool> {
        let cluster_id = self.get_default_cluster_id(
            entity, defaults_to_parent
        )?;
        self.is_native_provider(&cluster_id).await
    }
}

/// # Status
///
impl CryptoManager {
    /// Starts a status query for the selected providers.
    ///
    /// Without selectors all providers are queried. The registry state is
    /// captured right away, later changes do not affect the result.
    pub fn retrieve_status(
        &self, selectors: Vec<ClusterSelector>
    ) -> Task<Vec<ClusterStatus>> {
        let query = StatusQuery::new(self.registry.snapshot(), selectors);
        debug!(
            "Submitting status query for {} provider(s)",
            query.selectors().len()
        );
        self.tasks.submit("retrieveKmipServerStatus", move || Ok(query.run()))
    }

    /// Queries the status of the selected providers and waits for it.
    pub async fn get_status(
        &self, selectors: Vec<ClusterSelector>
    ) -> KmipResult<Vec<ClusterStatus>> {
        let res = self.retrieve_status(selectors).result().await?;
        Ok(res.unwrap_or_default())
    }

    /// Queries the status of a single provider.
    pub async fn get_cluster_status(
        &self, cluster_id: &ClusterId
    ) -> KmipResult<ClusterStatus> {
        self.get_status(
            vec![ClusterSelector::cluster(cluster_id.clone())]
        ).await?.into_iter().next().ok_or_else(|| {
            Error::InvalidClusterId(cluster_id.clone())
        })
    }

    /// Queries the status of a single server.
    pub async fn get_server_status(
        &self, cluster_id: &ClusterId, server_name: &str
    ) -> KmipResult<ServerStatus> {
        let selector = ClusterSelector::cluster(cluster_id.clone())
            .with_server(server_name);
        let cluster = self.get_status(vec![selector]).await?
            .into_iter().next()
            .ok_or_else(|| Error::InvalidClusterId(cluster_id.clone()))?;
        cluster.servers.into_iter().next().ok_or_else(|| {
            Error::InvalidServerName(
                cluster_id.clone(), server_name.to_string()
            )
        })
    }
}

/// # Keys
///
impl CryptoManager {
    pub fn generate_key(
        &self, cluster_id: Option<&ClusterId>
    ) -> KmipResult<CryptoKeyId> {
        self.keys.generate_key(cluster_id)
    }

    pub fn list_keys(&self, limit: Option<i32>) -> Vec<CryptoKeyId> {
        self.keys.list_keys(limit)
    }

    pub fn is_valid_key(&self, key_id: &str) -> bool {
        self.keys.is_valid_key(key_id)
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commons::error::ErrorKind;
    use crate::test::{cluster, entity, manager_with, server_spec};

    #[tokio::test]
    async fn provider_and_server_validity() {
        let _ = stderrlog::new().verbosity(99).init();
        let manager = manager_with(
            TaskRunner::current(), &[("pA", "KmsServer", &["s1"])]
        );
        assert!(manager.is_valid_provider(&cluster("pA")));
        assert!(!manager.is_valid_provider(&cluster("pB")));
        assert!(manager.is_valid_server(&cluster("pA"), "s1"));
        assert!(!manager.is_valid_server(&cluster("pA"), "s2"));
        assert!(!manager.is_valid_server(&cluster("pB"), "s1"));

        manager.remove_server(&cluster("pA"), "s1").unwrap();
        assert!(!manager.is_valid_server(&cluster("pA"), "s1"));
        assert_eq!(
            manager.remove_server(&cluster("pA"), "s1").unwrap_err().kind(),
            ErrorKind::InvalidServerName
        );
    }

    #[tokio::test]
    async fn native_providers() {
        let manager = manager_with(TaskRunner::current(), &[
            ("pA", "KmsServer", &["s1"]),
            ("native", "NativeProvider", &[]),
        ]);
        assert!(!manager.is_native_provider(&cluster("pA")).await.unwrap());
        assert!(manager.is_native_provider(&cluster("native")).await.unwrap());
        assert_eq!(
            manager.is_native_provider(&cluster("pX")).await,
            Err(Error::InvalidClusterId(cluster("pX")))
        );

        assert_eq!(
            manager.is_default_provider_native(None, false).await,
            Err(Error::NoDefaultProvider)
        );
        manager.mark_default(&cluster("native")).unwrap();
        assert!(manager.is_default_provider_native(None, false).await.unwrap());

        let vm = entity("VirtualMachine:vm-1");
        manager.set_default(Some(&cluster("pA")), Some(&vm)).unwrap();
        assert!(
            !manager.is_default_provider_native(Some(&vm), false).await.unwrap()
        );
    }

    #[tokio::test]
    async fn single_status_lookups() {
        let manager = manager_with(
            TaskRunner::current(), &[("pA", "KmsServer", &["s1", "s2"])]
        );

        let status = manager.get_cluster_status(&cluster("pA")).await.unwrap();
        assert_eq!(status.servers.len(), 2);
        assert_eq!(
            manager.get_cluster_status(&cluster("pB")).await,
            Err(Error::InvalidClusterId(cluster("pB")))
        );

        let server = manager.get_server_status(&cluster("pA"), "s2")
            .await.unwrap();
        assert_eq!(server.name, "s2");
        assert_eq!(
            manager.get_server_status(&cluster("pA"), "s3").await,
            Err(Error::InvalidServerName(cluster("pA"), "s3".into()))
        );
        assert_eq!(
            manager.get_server_status(&cluster("pB"), "s1").await,
            Err(Error::InvalidClusterId(cluster("pB")))
        );
    }

    #[tokio::test]
    async fn status_task_is_named() {
        let manager = manager_with(
            TaskRunner::current(), &[("pA", "KmsServer", &["s1"])]
        );
        let task = manager.retrieve_status(Vec::new());
        assert_eq!(task.info().name, "retrieveKmipServerStatus");
        let status = task.result().await.unwrap().unwrap();
        assert_eq!(status[0].cluster_id, cluster("pA"));
    }

    #[test]
    fn from_config_registers_everything() {
        let config = Config::from_toml(r#"
            [[providers]]
            cluster_id = "pA"
            management_type = "vCenter"
            entity_defaults = ["VirtualMachine:vm-1"]

            [[providers.servers]]
            name = "s1"
            address = "s1.example.com"
            port = 5696

            [[providers]]
            cluster_id = "pB"
            default = true
        "#).unwrap();
        let manager = CryptoManager::from_config(
            &config, TaskRunner::new(1).unwrap()
        ).unwrap();

        let clusters = manager.list_clusters(None);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].management_type, ManagementType::VCenter);
        assert_eq!(
            clusters[0].use_as_entity_default,
            [entity("VirtualMachine:vm-1")]
        );
        assert!(clusters[1].use_as_default);
        assert!(manager.is_valid_server(&cluster("pA"), "s1"));
        assert_eq!(
            manager.get_default_cluster_id(None, false).unwrap(),
            cluster("pB")
        );

        let res = manager.register_server(server_spec("pA", "s1"));
        assert_eq!(res.unwrap_err().kind(), ErrorKind::AlreadyRegistered);
    }
}
