//! Formatting command results for users.

use std::fmt::{self, Write};
use std::str::FromStr;
use serde::Serialize;
use crate::api::kmip::{
    ClusterId, ClusterStatus, CryptoKeyId, KmipClusterInfo,
};
use crate::api::status::ErrorResponse;


//------------ Report --------------------------------------------------------

/// The result of a command.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Report {
    Clusters(Vec<KmipClusterInfo>),
    DefaultCluster(ClusterId),
    Status(Vec<ClusterStatus>),
    Keys(Vec<CryptoKeyId>),
}

impl Report {
    pub fn render(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Json => {
                let mut res = to_json(self);
                res.push('\n');
                res
            }
            ReportFormat::Text => {
                let mut res = String::new();
                // Writing to a string cannot fail.
                let _ = self.write_text(&mut res);
                res
            }
        }
    }

    fn write_text(&self, res: &mut String) -> fmt::Result {
        match self {
            Report::Clusters(clusters) => {
                if clusters.is_empty() {
                    writeln!(res, "<none>")?;
                }
                for cluster in clusters {
                    write!(
                        res, "{} ({})", cluster.cluster_id,
                        cluster.management_type
                    )?;
                    if cluster.use_as_default {
                        write!(res, " [default]")?;
                    }
                    writeln!(res)?;
                    for entity in &cluster.use_as_entity_default {
                        writeln!(res, "  default for: {}", entity)?;
                    }
                    for server in &cluster.servers {
                        writeln!(
                            res, "  server: {} {}:{}",
                            server.name, server.address, server.port
                        )?;
                    }
                }
            }
            Report::DefaultCluster(cluster_id) => {
                writeln!(res, "{}", cluster_id)?;
            }
            Report::Status(clusters) => {
                if clusters.is_empty() {
                    writeln!(res, "<none>")?;
                }
                for cluster in clusters {
                    writeln!(
                        res, "{} ({}): {}", cluster.cluster_id,
                        cluster.management_type, cluster.overall_status
                    )?;
                    for server in &cluster.servers {
                        writeln!(res, "  {}: {}", server.name, server.status)?;
                    }
                }
            }
            Report::Keys(keys) => {
                if keys.is_empty() {
                    writeln!(res, "<none>")?;
                }
                for key in keys {
                    writeln!(res, "{} {}", key.key_id, key.provider_id)?;
                }
            }
        }
        Ok(())
    }
}


//------------ ReportFormat --------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReportFormat {
    Json,
    Text,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(ReportFormat::Json),
            "text" => Ok(ReportFormat::Text),
            _ => Err(format!("This report format is not recognised: {}", s)),
        }
    }
}


//------------ Helpers -------------------------------------------------------

/// Renders an error response, always as JSON.
pub fn render_error(err: &ErrorResponse) -> String {
    to_json(err)
}

fn to_json(value: &impl Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|err| {
        format!("{{\"error\": \"cannot serialize report: {}\"}}", err)
    })
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::kmip::{EntityStatus, ManagementType, ServerStatus};
    use crate::test::{cluster, entity, server};

    #[test]
    fn text_clusters() {
        let report = Report::Clusters(vec![
            KmipClusterInfo {
                cluster_id: cluster("pA"),
                management_type: ManagementType::VCenter,
                use_as_default: true,
                use_as_entity_default: vec![entity("VirtualMachine:vm-1")],
                servers: vec![server("s1")],
            }
        ]);
        assert_eq!(
            report.render(ReportFormat::Text),
            "pA (vCenter) [default]\n  \
             default for: VirtualMachine:vm-1\n  \
             server: s1 s1.example.com:5696\n"
        );
    }

    #[test]
    fn text_status() {
        let report = Report::Status(vec![
            ClusterStatus {
                cluster_id: cluster("pA"),
                management_type: ManagementType::from("KmsServer"),
                overall_status: EntityStatus::Green,
                servers: vec![ServerStatus {
                    name: "s1".into(),
                    status: EntityStatus::Green,
                }],
            }
        ]);
        assert_eq!(
            report.render(ReportFormat::Text),
            "pA (KmsServer): green\n  s1: green\n"
        );
        assert_eq!(
            Report::Status(vec![]).render(ReportFormat::Text), "<none>\n"
        );
    }

    #[test]
    fn json_keys() {
        let report = Report::Keys(vec![CryptoKeyId {
            key_id: "k1".into(),
            provider_id: cluster("pA"),
        }]);
        let json: serde_json::Value = serde_json::from_str(
            &report.render(ReportFormat::Json)
        ).unwrap();
        assert_eq!(json[0]["key_id"], "k1");
        assert_eq!(json[0]["provider_id"], "pA");
    }

    #[test]
    fn parse_format() {
        assert_eq!(ReportFormat::from_str("json"), Ok(ReportFormat::Json));
        assert!(ReportFormat::from_str("xml").is_err());
    }
}
