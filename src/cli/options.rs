//! The command line options.

use std::path::PathBuf;
use clap::Parser;
use crate::api::kmip::{ClusterId, ClusterSelector, EntityRef};
use crate::commons::KmipResult;
use crate::constants::{
    KMIPSIM_APP, KMIPSIM_DEFAULT_CONFIG_FILE, KMIPSIM_ENV_CONFIG,
    KMIPSIM_ENV_FORMAT,
};
use crate::server::CryptoManager;
use super::report::{Report, ReportFormat};


//------------ Options -------------------------------------------------------

/// The command line options for the simulator.
#[derive(clap::Parser)]
#[command(version, about = KMIPSIM_APP)]
pub struct Options {
    /// The config file defining the environment.
    #[arg(
        short, long,
        env = KMIPSIM_ENV_CONFIG,
        default_value = KMIPSIM_DEFAULT_CONFIG_FILE,
        value_name = "path"
    )]
    pub config: PathBuf,

    /// Report format
    #[arg(
        short, long,
        env = KMIPSIM_ENV_FORMAT,
        default_value = "text",
    )]
    pub format: ReportFormat,

    #[command(subcommand)]
    pub command: Command,
}

impl Options {
    /// Creates the options from the process arguments.
    ///
    /// If the arguments won’t result in usable options, exits the process.
    pub fn from_args() -> Self {
        Self::parse()
    }
}


//------------ Command -------------------------------------------------------

#[derive(clap::Subcommand)]
pub enum Command {
    /// List the registered key providers
    Clusters(Clusters),

    /// Show the default key provider
    Default(DefaultCluster),

    /// Show the status of key providers and their servers
    Status(Status),

    /// Generate keys
    GenerateKey(GenerateKey),

    /// List generated keys
    Keys(Keys),
}

impl Command {
    pub async fn run(self, manager: &CryptoManager) -> KmipResult<Report> {
        match self {
            Self::Clusters(cmd) => Ok(cmd.run(manager)),
            Self::Default(cmd) => cmd.run(manager),
            Self::Status(cmd) => cmd.run(manager).await,
            Self::GenerateKey(cmd) => cmd.run(manager),
            Self::Keys(cmd) => Ok(cmd.run(manager)),
        }
    }
}


//------------ Clusters ------------------------------------------------------

#[derive(clap::Parser)]
pub struct Clusters {
    /// Only list this many providers
    #[arg(long, allow_negative_numbers = true)]
    limit: Option<i32>,
}

impl Clusters {
    fn run(self, manager: &CryptoManager) -> Report {
        Report::Clusters(manager.list_clusters(self.limit))
    }
}


//------------ DefaultCluster ------------------------------------------------

#[derive(clap::Parser)]
pub struct DefaultCluster {
    /// The entity to show the default for, as kind:value
    #[arg(long, value_name = "entity")]
    entity: Option<EntityRef>,

    /// Fall back to the default of the parent entity
    #[arg(long)]
    defaults_to_parent: bool,
}

impl DefaultCluster {
    fn run(self, manager: &CryptoManager) -> KmipResult<Report> {
        manager.get_default_cluster_id(
            self.entity.as_ref(), self.defaults_to_parent
        ).map(Report::DefaultCluster)
    }
}


//------------ Status --------------------------------------------------------

#[derive(clap::Parser)]
pub struct Status {
    /// Only show this provider
    #[arg(long, value_name = "id")]
    cluster: Option<ClusterId>,

    /// Only show these servers of the provider
    #[arg(long = "server", value_name = "name", requires = "cluster")]
    servers: Vec<String>,
}

impl Status {
    async fn run(self, manager: &CryptoManager) -> KmipResult<Report> {
        let selectors = match self.cluster {
            Some(cluster_id) => vec![ClusterSelector {
                cluster_id,
                servers: self.servers,
            }],
            None => Vec::new(),
        };
        manager.get_status(selectors).await.map(Report::Status)
    }
}


//------------ GenerateKey ---------------------------------------------------

#[derive(clap::Parser)]
pub struct GenerateKey {
    /// The provider to use instead of the default provider
    #[arg(long, value_name = "id")]
    cluster: Option<ClusterId>,

    /// The number of keys to generate
    #[arg(long, default_value_t = 1)]
    count: u32,
}

impl GenerateKey {
    fn run(self, manager: &CryptoManager) -> KmipResult<Report> {
        let keys = (0..self.count).map(|_| {
            manager.generate_key(self.cluster.as_ref())
        }).collect::<KmipResult<Vec<_>>>()?;
        Ok(Report::Keys(keys))
    }
}


//------------ Keys ----------------------------------------------------------

#[derive(clap::Parser)]
pub struct Keys {
    /// Only list this many keys
    #[arg(long, allow_negative_numbers = true)]
    limit: Option<i32>,
}

impl Keys {
    fn run(self, manager: &CryptoManager) -> Report {
        Report::Keys(manager.list_keys(self.limit))
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::runtime::TaskRunner;
    use crate::test::{cluster, manager_with};

    fn parse(args: &[&str]) -> Options {
        Options::try_parse_from(
            ["kmipsim"].into_iter().chain(args.iter().copied())
        ).unwrap()
    }

    #[test]
    fn parse_options() {
        let options = parse(&["--format", "json", "clusters", "--limit", "-1"]);
        assert_eq!(options.format, ReportFormat::Json);
        assert!(matches!(
            options.command, Command::Clusters(Clusters { limit: Some(-1) })
        ));

        let options = parse(&[
            "status", "--cluster", "pA", "--server", "s1", "--server", "s2"
        ]);
        match options.command {
            Command::Status(status) => {
                assert_eq!(status.cluster, Some(cluster("pA")));
                assert_eq!(status.servers, ["s1", "s2"]);
            }
            _ => panic!("expected status command"),
        }

        assert!(Options::try_parse_from(
            ["kmipsim", "status", "--server", "s1"]
        ).is_err());
        assert!(Options::try_parse_from(
            ["kmipsim", "default", "--entity", "vm-1"]
        ).is_err());
    }

    #[tokio::test]
    async fn run_commands() {
        let manager = manager_with(
            TaskRunner::current(), &[("pA", "KmsServer", &["s1", "s2"])]
        );
        manager.mark_default(&cluster("pA")).unwrap();

        let report = parse(&["generate-key", "--count", "3"]).command
            .run(&manager).await.unwrap();
        assert!(matches!(report, Report::Keys(ref keys) if keys.len() == 3));

        let report = parse(&["keys", "--limit", "2"]).command
            .run(&manager).await.unwrap();
        assert!(matches!(report, Report::Keys(ref keys) if keys.len() == 2));

        let report = parse(&["default"]).command
            .run(&manager).await.unwrap();
        assert!(matches!(report, Report::DefaultCluster(ref id) if id.as_str() == "pA"));

        let report = parse(&["status", "--cluster", "pA", "--server", "s2"])
            .command.run(&manager).await.unwrap();
        match report {
            Report::Status(status) => {
                assert_eq!(status.len(), 1);
                assert_eq!(status[0].servers.len(), 1);
                assert_eq!(status[0].servers[0].name, "s2");
            }
            _ => panic!("expected status report"),
        }

        assert!(
            parse(&["generate-key", "--cluster", "pX"]).command
                .run(&manager).await.is_err()
        );
    }
}
