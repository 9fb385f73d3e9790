//! Scout CLI entry point.

use clap::Parser;

use scout::cli::{self, runtime, Cli};
use scout::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let config = match runtime::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => cli::handle_error(&err, json),
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => cli::handle_error(&err, json),
    };

    if let Err(err) = cli::execute(cli, config).await {
        tracing::debug!(error = %err, "command failed");
        cli::handle_error(&err, json);
    }
}
