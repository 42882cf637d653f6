//! # Folio
//!
//! Command-line entry point.

use clap::Parser;
use folio_cli::CliArgs;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = CliArgs::parse();
    tracing::debug!("Arguments: {:?}", args);

    let written = folio_cli::run(args).await?;
    tracing::info!("Done, {} file(s) written", written.len());
    Ok(())
}

/// Log to stderr so scene and template JSON on stdout stays clean.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("folio_cli=info,folio_core=info,folio_renderer=info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false);

    // Use JSON format for machine consumers (RUST_LOG_FORMAT=json)
    if std::env::var("RUST_LOG_FORMAT").is_ok_and(|v| v == "json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}
