//! Configuration of a simulated environment.
//!
//! The configuration is read from a TOML file. It sets up logging and
//! lists the providers the environment starts out with.

use std::{env, fmt, fs, io};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use log::{LevelFilter, error};
use serde::de;
use serde::{Deserialize, Deserializer};
use crate::api::kmip::{ClusterId, EntityRef, KmipServerInfo, ManagementType};
use crate::constants::{DEFAULT_TASK_THREADS, KMIPSIM_ENV_LOG_LEVEL};


//------------ ConfigDefaults ------------------------------------------------

pub struct ConfigDefaults;

impl ConfigDefaults {
    fn log_level() -> LevelFilter {
        env::var(KMIPSIM_ENV_LOG_LEVEL).ok()
            .and_then(|level| LevelFilter::from_str(&level).ok())
            .unwrap_or(LevelFilter::Info)
    }

    fn log_type() -> LogType {
        LogType::Stderr
    }

    fn log_file() -> PathBuf {
        PathBuf::from("./kmipsim.log")
    }

    fn task_threads() -> usize {
        DEFAULT_TASK_THREADS
    }
}


//------------ Config --------------------------------------------------------

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(
        default = "ConfigDefaults::log_level",
        deserialize_with = "de_level_filter"
    )]
    pub log_level: LevelFilter,

    #[serde(default = "ConfigDefaults::log_type")]
    pub log_type: LogType,

    #[serde(default = "ConfigDefaults::log_file")]
    pub log_file: PathBuf,

    #[serde(default = "ConfigDefaults::task_threads")]
    pub task_threads: usize,

    /// The providers registered when the environment starts.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: ConfigDefaults::log_level(),
            log_type: ConfigDefaults::log_type(),
            log_file: ConfigDefaults::log_file(),
            task_threads: ConfigDefaults::task_threads(),
            providers: Vec::new(),
        }
    }
}

/// # Loading
///
impl Config {
    /// Reads and verifies the config file at the given path.
    pub fn read_config(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.verify()?;
        Ok(config)
    }

    pub fn verify(&self) -> Result<(), ConfigError> {
        if self.task_threads == 0 {
            return Err(ConfigError::other("task_threads must be at least 1"))
        }

        let mut ids = HashSet::new();
        let mut entities = HashMap::new();
        let mut default = None;

        for provider in &self.providers {
            if !ids.insert(&provider.cluster_id) {
                return Err(ConfigError::Other(format!(
                    "Duplicate provider '{}'", provider.cluster_id
                )))
            }

            if provider.default {
                if let Some(other) = default.replace(&provider.cluster_id) {
                    return Err(ConfigError::Other(format!(
                        "Providers '{}' and '{}' are both marked as default",
                        other, provider.cluster_id
                    )))
                }
            }

            let mut names = HashSet::new();
            for server in &provider.servers {
                if !names.insert(server.name.as_str()) {
                    return Err(ConfigError::Other(format!(
                        "Duplicate server '{}' for provider '{}'",
                        server.name, provider.cluster_id
                    )))
                }
            }

            for entity in &provider.entity_defaults {
                if let Some(other) = entities.insert(
                    entity, &provider.cluster_id
                ) {
                    return Err(ConfigError::Other(format!(
                        "Entity '{}' has defaults '{}' and '{}'",
                        entity, other, provider.cluster_id
                    )))
                }
            }
        }

        Ok(())
    }
}

/// # Logging
///
impl Config {
    pub fn init_logging(&self) -> Result<(), ConfigError> {
        match self.log_type {
            LogType::File => self.file_logger(&self.log_file),
            LogType::Stderr => self.stderr_logger(),
        }
    }

    /// Creates a stderr logger.
    fn stderr_logger(&self) -> Result<(), ConfigError> {
        self.fern_logger()
            .chain(io::stderr())
            .apply()
            .map_err(|e| {
                ConfigError::Other(
                    format!("Failed to init stderr logging: {}", e)
                )
            })
    }

    /// Creates a file logger using the file provided by `path`.
    fn file_logger(&self, path: &Path) -> Result<(), ConfigError> {
        let file = match fern::log_file(path) {
            Ok(file) => file,
            Err(err) => {
                let error_string = format!(
                    "Failed to open log file '{}': {}", path.display(), err
                );
                error!("{}", error_string.as_str());
                return Err(ConfigError::Other(error_string));
            }
        };
        self.fern_logger()
            .chain(file)
            .apply()
            .map_err(|e| {
                ConfigError::Other(
                    format!("Failed to init file logging: {}", e)
                )
            })
    }

    /// Creates and returns a fern logger.
    fn fern_logger(&self) -> fern::Dispatch {
        let tokio_level = self.log_level.min(LevelFilter::Warn);

        let show_target = self.log_level == LevelFilter::Trace
            || self.log_level == LevelFilter::Debug;
        fern::Dispatch::new()
            .format(move |out, message, record| {
                if show_target {
                    out.finish(format_args!(
                        "{} [{}] [{}] {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                        record.level(),
                        record.target(),
                        message
                    ))
                } else {
                    out.finish(format_args!(
                        "{} [{}] {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                        record.level(),
                        message
                    ))
                }
            })
            .level(self.log_level)
            .level_for("tokio", tokio_level)
    }
}


//------------ ProviderConfig ------------------------------------------------

/// A provider to register when the environment starts.
#[derive(Clone, Debug, Deserialize)]
pub struct ProviderConfig {
    pub cluster_id: ClusterId,

    #[serde(default)]
    pub management_type: ManagementType,

    /// Whether the provider is the global default.
    #[serde(default)]
    pub default: bool,

    /// The entities this provider is the default for.
    #[serde(default)]
    pub entity_defaults: Vec<EntityRef>,

    #[serde(default)]
    pub servers: Vec<KmipServerInfo>,
}


//------------ LogType -------------------------------------------------------

/// The target to log to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LogType {
    Stderr,
    File,
}

impl<'de> Deserialize<'de> for LogType {
    fn deserialize<D>(d: D) -> Result<LogType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(d)?;
        match string.as_str() {
            "stderr" => Ok(LogType::Stderr),
            "file" => Ok(LogType::File),
            _ => Err(de::Error::custom(format!(
                "expected \"stderr\" or \"file\", found : \"{}\"",
                string
            ))),
        }
    }
}

fn de_level_filter<'de, D>(d: D) -> Result<LevelFilter, D::Error>
where
    D: Deserializer<'de>,
{
    let string = String::deserialize(d)?;
    LevelFilter::from_str(&string).map_err(de::Error::custom)
}


//------------ ConfigError ---------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    IoError(io::Error),
    TomlError(toml::de::Error),
    Other(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => e.fmt(f),
            ConfigError::TomlError(e) => e.fmt(f),
            ConfigError::Other(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for ConfigError { }

impl ConfigError {
    pub fn other(s: &str) -> ConfigError {
        ConfigError::Other(s.to_string())
    }
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::IoError(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::TomlError(e)
    }
}


//------------ Tests ---------------------------------------------------------
