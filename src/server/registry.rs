//! The registry of key providers.
//!
//! The registry owns the ordered list of registered providers (clusters of
//! KMIP servers), the servers of each provider, and the assignment of
//! default providers: one global default and any number of per-entity
//! defaults.
//!
//! All state lives behind a single lock. Every mutating operation validates
//! its input while holding the write lock and only then applies its change,
//! so a failed call never leaves a partial change behind and readers never
//! observe one.

use std::collections::BTreeMap;
use std::sync::RwLock;
use log::{debug, info, warn};
use crate::api::kmip::{
    ClusterId, EntityRef, KmipClusterInfo, KmipServerInfo, KmipServerSpec,
    ManagementType,
};
use crate::commons::{KmipEmptyResult, KmipResult};
use crate::commons::error::Error;
use super::effective_limit;


//------------ ProviderRegistry ----------------------------------------------

/// The registered key providers of a single environment.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: RwLock<Providers>,
}

/// # Queries
///
impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns up to `limit` providers in registration order.
    ///
    /// A missing, negative, or too large limit returns all providers.
    pub fn list_clusters(&self, limit: Option<i32>) -> Vec<KmipClusterInfo> {
        let providers = self.providers.read().unwrap();
        let len = effective_limit(limit, providers.clusters.len());
        providers.clusters[..len].iter().map(|provider| {
            providers.cluster_info(provider)
        }).collect()
    }

    /// Returns a copy of the complete current state.
    pub fn snapshot(&self) -> Vec<KmipClusterInfo> {
        self.list_clusters(None)
    }

    /// Returns the provider with the given ID, if registered.
    pub fn get_cluster(&self, cluster_id: &ClusterId) -> Option<KmipClusterInfo> {
        let providers = self.providers.read().unwrap();
        providers.get(cluster_id).map(|provider| {
            providers.cluster_info(provider)
        })
    }

    pub fn has_cluster(&self, cluster_id: &ClusterId) -> bool {
        self.providers.read().unwrap().position(cluster_id).is_some()
    }

    /// Returns the ID of the default provider.
    ///
    /// If an entity is given, this is the provider that is the default for
    /// this entity. There is no fallback to the global default in this case.
    /// Otherwise it is the global default provider.
    ///
    /// Falling back to the default of a parent entity is not supported. The
    /// `defaults_to_parent` flag is accepted but has no effect.
    pub fn get_default_cluster_id(
        &self,
        entity: Option<&EntityRef>,
        defaults_to_parent: bool,
    ) -> KmipResult<ClusterId> {
        if defaults_to_parent {
            warn!(
                "Parent entity fallback for default providers is not \
                 supported, ignoring defaults_to_parent"
            );
        }
        let providers = self.providers.read().unwrap();
        let found = match entity {
            Some(entity) => providers.entity_defaults.get(entity),
            None => providers.default.as_ref(),
        };
        match found {
            Some(cluster_id) => {
                debug!("Default provider resolved to '{}'", cluster_id);
                Ok(cluster_id.clone())
            }
            None => Err(Error::NoDefaultProvider),
        }
    }

    /// Resolves the provider to act on.
    ///
    /// This is the provider with the given ID, or the global default if no
    /// ID is given. Both cases fail with [`Error::NoDefaultProvider`] if
    /// there is no such provider.
    pub fn resolve_provider(
        &self, cluster_id: Option<&ClusterId>
    ) -> KmipResult<KmipClusterInfo> {
        self.with_provider(cluster_id, |info| Ok(info.clone()))
    }

    /// Resolves the provider to act on and runs `op` with it.
    ///
    /// The provider is resolved as by [`Self::resolve_provider`]. The
    /// registry stays locked for reading until `op` returns, so the
    /// provider cannot be unregistered or replaced while `op` runs.
    /// `op` must not call back into the registry for writing.
    pub fn with_provider<F, R>(
        &self, cluster_id: Option<&ClusterId>, op: F
    ) -> KmipResult<R>
    where
        F: FnOnce(&KmipClusterInfo) -> KmipResult<R>,
    {
        let providers = self.providers.read().unwrap();
        let provider = match cluster_id {
            Some(cluster_id) => providers.get(cluster_id),
            None => {
                providers.default.as_ref().and_then(|id| providers.get(id))
            }
        };
        let info = provider
            .map(|provider| providers.cluster_info(provider))
            .ok_or(Error::NoDefaultProvider)?;
        op(&info)
    }
}

/// # Default providers
///
impl ProviderRegistry {
    /// Changes the default provider assignment.
    ///
    /// With a non-empty cluster ID the provider becomes the global default,
    /// or the default for the given entity, taking over from whichever
    /// provider held that role before. Without a cluster ID the given
    /// entity loses its default provider, or, if no entity is given either,
    /// the global default is cleared.
    ///
    /// An unknown cluster ID fails with [`Error::InvalidClusterId`] and
    /// leaves all assignments untouched.
    pub fn set_default(
        &self,
        cluster_id: Option<&ClusterId>,
        entity: Option<&EntityRef>,
    ) -> KmipEmptyResult {
        let mut providers = self.providers.write().unwrap();
        let cluster_id = cluster_id.filter(|id| !id.is_empty());

        match (cluster_id, entity) {
            (Some(cluster_id), entity) => {
                if providers.position(cluster_id).is_none() {
                    return Err(Error::InvalidClusterId(cluster_id.clone()))
                }
                match entity {
                    Some(entity) => {
                        info!(
                            "Provider '{}' is now the default for '{}'",
                            cluster_id, entity
                        );
                        providers.entity_defaults.insert(
                            entity.clone(), cluster_id.clone()
                        );
                    }
                    None => {
                        info!(
                            "Provider '{}' is now the global default",
                            cluster_id
                        );
                        providers.default = Some(cluster_id.clone());
                    }
                }
            }
            (None, Some(entity)) => {
                if let Some(old) = providers.entity_defaults.remove(entity) {
                    info!(
                        "Provider '{}' is no longer the default for '{}'",
                        old, entity
                    );
                }
            }
            (None, None) => {
                if let Some(old) = providers.default.take() {
                    info!(
                        "Provider '{}' is no longer the global default", old
                    );
                }
            }
        }
        Ok(())
    }

    /// Makes the given provider the global default.
    pub fn mark_default(&self, cluster_id: &ClusterId) -> KmipEmptyResult {
        self.set_default(Some(cluster_id), None)
    }
}

/// # Providers and servers
///
impl ProviderRegistry {
    pub fn register_cluster(
        &self,
        cluster_id: ClusterId,
        management_type: ManagementType,
    ) -> KmipEmptyResult {
        let mut providers = self.providers.write().unwrap();
        if providers.position(&cluster_id).is_some() {
            return Err(Error::ClusterAlreadyRegistered(cluster_id))
        }
        info!(
            "Registered provider '{}' with management type '{}'",
            cluster_id, management_type
        );
        providers.clusters.push(Provider {
            cluster_id,
            management_type,
            servers: Vec::new(),
        });
        Ok(())
    }

    /// Removes a provider together with its servers and default roles.
    pub fn unregister_cluster(&self, cluster_id: &ClusterId) -> KmipEmptyResult {
        let mut providers = self.providers.write().unwrap();
        let pos = providers.position(cluster_id).ok_or_else(|| {
            Error::InvalidClusterId(cluster_id.clone())
        })?;
        providers.clusters.remove(pos);
        if providers.default.as_ref() == Some(cluster_id) {
            providers.default = None;
        }
        providers.entity_defaults.retain(|_, owner| owner != cluster_id);
        info!("Unregistered provider '{}'", cluster_id);
        Ok(())
    }

    pub fn register_server(&self, spec: KmipServerSpec) -> KmipEmptyResult {
        let mut providers = self.providers.write().unwrap();
        let provider = providers.get_mut_or_err(&spec.cluster_id)?;
        if provider.server_position(&spec.info.name).is_some() {
            return Err(Error::ServerAlreadyRegistered(
                spec.cluster_id, spec.info.name
            ))
        }
        info!(
            "Registered server '{}' for provider '{}'",
            spec.info.name, spec.cluster_id
        );
        provider.servers.push(spec.info);
        Ok(())
    }

    /// Replaces the info of an existing server, keeping its position.
    pub fn update_server(&self, spec: KmipServerSpec) -> KmipEmptyResult {
        let mut providers = self.providers.write().unwrap();
        let provider = providers.get_mut_or_err(&spec.cluster_id)?;
        let pos = provider.server_position(&spec.info.name).ok_or_else(|| {
            Error::InvalidServerName(
                spec.cluster_id.clone(), spec.info.name.clone()
            )
        })?;
        info!(
            "Updated server '{}' for provider '{}'",
            spec.info.name, spec.cluster_id
        );
        provider.servers[pos] = spec.info;
        Ok(())
    }

    pub fn remove_server(
        &self, cluster_id: &ClusterId, server_name: &str
    ) -> KmipEmptyResult {
        let mut providers = self.providers.write().unwrap();
        let provider = providers.get_mut_or_err(cluster_id)?;
        let pos = provider.server_position(server_name).ok_or_else(|| {
            Error::InvalidServerName(
                cluster_id.clone(), server_name.to_string()
            )
        })?;
        provider.servers.remove(pos);
        info!(
            "Removed server '{}' from provider '{}'", server_name, cluster_id
        );
        Ok(())
    }
}


//------------ Providers -----------------------------------------------------

/// The state guarded by the registry lock.
///
/// Default roles are kept apart from the providers they point to so that
/// there can only ever be one global default and one default per entity.
/// Both only ever point to registered providers.
#[derive(Clone, Debug, Default)]
struct Providers {
    clusters: Vec<Provider>,
    default: Option<ClusterId>,
    entity_defaults: BTreeMap<EntityRef, ClusterId>,
}

impl Providers {
    fn position(&self, cluster_id: &ClusterId) -> Option<usize> {
        self.clusters.iter().position(|p| &p.cluster_id == cluster_id)
    }

    fn get(&self, cluster_id: &ClusterId) -> Option<&Provider> {
        self.clusters.iter().find(|p| &p.cluster_id == cluster_id)
    }

    fn get_mut_or_err(
        &mut self, cluster_id: &ClusterId
    ) -> KmipResult<&mut Provider> {
        self.clusters.iter_mut()
            .find(|p| &p.cluster_id == cluster_id)
            .ok_or_else(|| Error::InvalidClusterId(cluster_id.clone()))
    }

    fn cluster_info(&self, provider: &Provider) -> KmipClusterInfo {
        KmipClusterInfo {
            cluster_id: provider.cluster_id.clone(),
            management_type: provider.management_type.clone(),
            use_as_default: {
                self.default.as_ref() == Some(&provider.cluster_id)
            },
            use_as_entity_default: {
                self.entity_defaults.iter()
                    .filter(|(_, owner)| *owner == &provider.cluster_id)
                    .map(|(entity, _)| entity.clone())
                    .collect()
            },
            servers: provider.servers.clone(),
        }
    }
}


//------------ Provider ------------------------------------------------------

#[derive(Clone, Debug)]
struct Provider {
    cluster_id: ClusterId,
    management_type: ManagementType,
    servers: Vec<KmipServerInfo>,
}

impl Provider {
    fn server_position(&self, name: &str) -> Option<usize> {
        self.servers.iter().position(|server| server.name == name)
    }
}


//============ Tests =========================================================
