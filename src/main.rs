#![cfg(not(tarpaulin_include))]

use bp_tracker::app;
use bp_tracker::config::Config;
use std::env;
use std::path::PathBuf;

/// Main entry point for the blood pressure tracker
///
/// Loads the configuration and serves the web interface until the process is
/// stopped.
///
/// # Arguments
/// * Optional path to a JSON config file as the first argument; otherwise
///   `bp-tracker.json` in the working directory is used if it exists
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let config_path = args.get(1).map(PathBuf::from);

    let config = Config::load(config_path.as_deref())?;

    app::run(config).await
}
