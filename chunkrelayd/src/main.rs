use std::process::ExitCode;

use chunkrelayd::{Config, config, telemetry};
use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let env_file = config::load_env_file();
    let config = Config::parse();
    telemetry::init_tracing("info");
    env_file.log();

    match chunkrelayd::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "consumer failed");
            ExitCode::FAILURE
        }
    }
}
