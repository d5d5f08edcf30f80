//! Resolving the status of key providers and their servers.

use log::debug;
use crate::api::kmip::{
    ClusterSelector, ClusterStatus, EntityStatus, KmipClusterInfo,
    ServerStatus,
};


//------------ StatusQuery ---------------------------------------------------

/// A status query bound to a snapshot of the registry.
///
/// The query is created when the status is requested and run later as a
/// task. Because it only holds copies of the registry state as it was at
/// creation time, changes made to the registry while the query is waiting
/// to be run do not affect its result.
#[derive(Clone, Debug)]
pub struct StatusQuery {
    /// The registered providers at the time of the query.
    registered: Vec<KmipClusterInfo>,

    /// The providers and servers asked for, with empty server lists
    /// already expanded.
    selectors: Vec<ClusterSelector>,
}

impl StatusQuery {
    /// Creates a new query for the given registry state.
    ///
    /// If no selectors are given, all registered providers and all their
    /// servers are selected. A selector without servers selects all the
    /// servers its provider currently has.
    pub fn new(
        registered: Vec<KmipClusterInfo>,
        selectors: Vec<ClusterSelector>,
    ) -> Self {
        let selectors = if selectors.is_empty() {
            registered.iter().map(ClusterSelector::from).collect()
        } else {
            selectors.into_iter().map(|mut selector| {
                if selector.servers.is_empty() {
                    if let Some(cluster) = registered.iter().find(|c| {
                        c.cluster_id == selector.cluster_id
                    }) {
                        selector = ClusterSelector::from(cluster);
                    }
                }
                selector
            }).collect()
        };
        StatusQuery { registered, selectors }
    }

    pub fn selectors(&self) -> &[ClusterSelector] {
        &self.selectors
    }

    /// Resolves the status of the selected providers.
    ///
    /// Providers are reported in registry order. Selected providers that
    /// are not registered are left out, as are selected servers that their
    /// provider does not have. Returns `None` if nothing was selected.
    pub fn run(&self) -> Option<Vec<ClusterStatus>> {
        let mut res = Vec::new();

        for cluster in &self.registered {
            for selector in &self.selectors {
                if selector.cluster_id != cluster.cluster_id {
                    continue
                }
                let servers = cluster.servers.iter().flat_map(|server| {
                    selector.servers.iter()
                        .filter(move |name| **name == server.name)
                        .map(|name| ServerStatus {
                            name: name.clone(),
                            status: EntityStatus::Green,
                        })
                }).collect();
                res.push(ClusterStatus {
                    cluster_id: cluster.cluster_id.clone(),
                    management_type: cluster.management_type.clone(),
                    overall_status: EntityStatus::Green,
                    servers,
                });
            }
        }

        debug!("Resolved status for {} provider(s)", res.len());
        if res.is_empty() {
            None
        } else {
            Some(res)
        }
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::kmip::{ClusterId, KmipServerInfo, ManagementType};
    use crate::test::cluster;

    fn info(id: &str, servers: &[&str]) -> KmipClusterInfo {
        KmipClusterInfo {
            cluster_id: ClusterId::from(id),
            management_type: ManagementType::from("KmsServer"),
            use_as_default: false,
            use_as_entity_default: Vec::new(),
            servers: servers.iter().copied().map(KmipServerInfo::named)
                .collect(),
        }
    }

    fn server_names(status: &ClusterStatus) -> Vec<&str> {
        status.servers.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn all_providers_without_selectors() {
        let query = StatusQuery::new(
            vec![info("pA", &["s1", "s2"]), info("pB", &[])], vec![]
        );
        let res = query.run().unwrap();
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].cluster_id, cluster("pA"));
        assert_eq!(res[0].overall_status, EntityStatus::Green);
        assert_eq!(server_names(&res[0]), ["s1", "s2"]);
        assert!(res[0].servers.iter().all(|s| {
            s.status == EntityStatus::Green
        }));
        assert_eq!(res[1].cluster_id, cluster("pB"));
        assert!(res[1].servers.is_empty());
    }

    #[test]
    fn nothing_registered() {
        assert!(StatusQuery::new(vec![], vec![]).run().is_none());
    }

    #[test]
    fn registry_order_is_kept() {
        let query = StatusQuery::new(
            vec![info("pA", &["s1"]), info("pB", &["s1"])],
            vec![
                ClusterSelector::cluster(cluster("pB")),
                ClusterSelector::cluster(cluster("pA")),
            ]
        );
        let ids: Vec<_> = query.run().unwrap().into_iter()
            .map(|s| s.cluster_id)
            .collect();
        assert_eq!(ids, [cluster("pA"), cluster("pB")]);
    }

    #[test]
    fn server_subsets() {
        let query = StatusQuery::new(
            vec![info("pA", &["s1", "s2", "s3"])],
            vec![
                ClusterSelector::cluster(cluster("pA"))
                    .with_server("s3")
                    .with_server("nope")
                    .with_server("s1")
            ]
        );
        let res = query.run().unwrap();
        assert_eq!(server_names(&res[0]), ["s1", "s3"]);
    }

    #[test]
    fn unknown_providers_are_skipped() {
        let query = StatusQuery::new(
            vec![info("pA", &["s1"])],
            vec![ClusterSelector::cluster(cluster("pX"))]
        );
        assert_eq!(query.selectors()[0].servers, Vec::<String>::new());
        assert!(query.run().is_none());
    }

    #[test]
    fn empty_selector_expands_to_current_servers() {
        let query = StatusQuery::new(
            vec![info("pA", &["s1", "s2"])],
            vec![ClusterSelector::cluster(cluster("pA"))]
        );
        assert_eq!(query.selectors()[0].servers, ["s1", "s2"]);
    }
}
