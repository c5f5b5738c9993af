#![cfg(not(tarpaulin_include))]

use sheetmail::app;
use sheetmail::config::Config;
use std::env;

/// Main entry point for the dashboard server
///
/// Settings come from `SHEETMAIL_*` environment variables; a port given as
/// the first command line argument wins over `SHEETMAIL_PORT`.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let mut config = Config::from_env();

    if args.len() >= 2 {
        config.port = args[1].parse().unwrap_or(config.port);
    }

    log::info!(
        "Starting dashboard on {} (smtp {}:{})",
        config.address(),
        config.smtp_host,
        config.smtp_port
    );
    app::run(config).await
}
