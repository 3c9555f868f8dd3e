use clap::Parser;
use tracing::debug;

use dockdig::app;
use dockdig::config::cli::CliArgs;
use dockdig::AppError;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = CliArgs::parse();
    let config = cli.into_config()?;

    // the live report owns stdout, diagnostics go to stderr
    let log_level = if config.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();
    debug!("debug logging enabled");

    app::dig_and_report(config).await
}
