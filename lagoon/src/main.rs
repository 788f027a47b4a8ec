use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use lagoon_core::gauge::ConnectionGauge;
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

mod app;
mod config;
mod runtime;
mod server;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path of the config file
    #[clap(short, long, value_parser)]
    config: String,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    let config = Arc::new(config::load(&args.config)?);
    info!(
        "starting {} on {} with {} workers",
        config.server.name, config.server.listen, config.runtime.worker_threads
    );

    let gauge = ConnectionGauge::new();
    let fleet = server::spawn_workers(config, gauge, |_worker_id| {
        (
            app::EchoApp,
            app::MemorySessionStore::default(),
            app::LoggingHub,
        )
    })?;
    fleet.join();
    Ok(())
}
