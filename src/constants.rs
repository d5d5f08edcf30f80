//! Various crate-wide constants.


//------------ Binary Names -------------------------------------------------

/// The friendly name of the `kmipsim` binary.
pub const KMIPSIM_APP: &str = "KMIP Crypto Manager Simulator";


//------------ Config Files Paths -------------------------------------------

/// The default path to the config file.
pub const KMIPSIM_DEFAULT_CONFIG_FILE: &str = "./defaults/kmipsim.conf";


//------------ Environment Variables ----------------------------------------

/// The environment variable to override the configured log level.
pub const KMIPSIM_ENV_LOG_LEVEL: &str = "KMIPSIM_LOG_LEVEL";

/// The environment variable for the config file used by the CLI.
pub const KMIPSIM_ENV_CONFIG: &str = "KMIPSIM_CONFIG";

/// The environment variable for the CLI report format.
pub const KMIPSIM_ENV_FORMAT: &str = "KMIPSIM_FORMAT";


//------------ Tasks --------------------------------------------------------

/// The default number of worker threads of the task runtime.
pub const DEFAULT_TASK_THREADS: usize = 2;
