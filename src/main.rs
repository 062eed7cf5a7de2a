mod cli;
mod config;
mod model;
mod providers;
mod storage;
mod sync;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::Cli;
use config::Settings;
use sync::Reconciler;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let file_config = config::load_config(cli.config.as_deref())?;
    let settings = Settings::resolve(file_config, &cli)?;

    init_tracing(cli.verbose, &settings.log_level);
    debug!(?settings, "Resolved settings");

    let source = providers::create_source(&settings.vikunja);
    let store = storage::create_store(&settings.destination);

    let report = Reconciler::new(source.as_ref(), store.as_ref())
        .dry_run(cli.dry_run)
        .combined_json(settings.combined_json)
        .run()
        .await?;

    if report.failed > 0 {
        warn!(
            failed = report.failed,
            "Some remote operations failed and will be retried on the next run"
        );
    }
    Ok(())
}

/// RUST_LOG wins when set; otherwise `-v` flags, then the configured level.
fn init_tracing(verbose: u8, log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_filter(verbose, log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Dependencies stay at `warn`; only this crate follows the chosen level.
fn log_filter(verbose: u8, log_level: &str) -> String {
    let level = match verbose {
        0 => log_level.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    format!("warn,vikunja_export={level}")
}
