extern crate kmipsim;

use kmipsim::api::status::{ErrorResponse, FaultCategory};
use kmipsim::cli::options::Options;
use kmipsim::cli::report::render_error;
use kmipsim::config::Config;
use kmipsim::server::CryptoManager;
use kmipsim::server::runtime::TaskRunner;

fn error(error: ErrorResponse) -> ! {
    eprintln!("{}", render_error(&error));
    ::std::process::exit(1);
}

fn main() {
    let options = Options::from_args();

    let config = match Config::read_config(&options.config) {
        Ok(config) => config,
        Err(e) => error(
            ErrorResponse::new(
                FaultCategory::InvalidArgument,
                "config-error",
                format!(
                    "Cannot read config file '{}'", options.config.display()
                ),
            ).with_cause(e)
        ),
    };
    if let Err(e) = config.init_logging() {
        error(ErrorResponse::new(
            FaultCategory::InvalidArgument, "config-error", e
        ))
    }

    let tasks = match TaskRunner::new(config.task_threads) {
        Ok(tasks) => tasks,
        Err(e) => error(e.to_error_response()),
    };
    let manager = match CryptoManager::from_config(&config, tasks.clone()) {
        Ok(manager) => manager,
        Err(e) => error(e.to_error_response()),
    };

    match tasks.block_on(options.command.run(&manager)) {
        Ok(report) => print!("{}", report.render(options.format)),
        Err(e) => error(e.to_error_response()),
    }
}
