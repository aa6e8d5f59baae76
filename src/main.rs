mod api;
mod cli;
mod config;
mod error;
mod flags;
mod model;
mod orchestrator;
mod params;
mod preview;
mod text_summary;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = cli::Cli::parse();

    // RUST_LOG wins over -v.
    let default_level = match args.verbose {
        0 => "llm_dock_bench=warn",
        1 => "llm_dock_bench=info",
        _ => "llm_dock_bench=debug",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    cli::run(args).await
}
