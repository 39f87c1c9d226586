//! CineVision chunked uploader entry point.

mod app;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries only results.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = app::Cli::parse();

    let config = config::Config::load(cli.config.as_deref())?;
    let config = cli.apply(config);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        api_url = %config.api_url,
        "starting CineVision uploader"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(cli, config))
}
