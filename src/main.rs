#![recursion_limit = "256"]

mod cli;
mod application;
mod domain;
mod data;
mod ml;
mod infra;

use anyhow::Result;
use cli::Cli;
use clap::Parser;
use domain::error::ErrorKind;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mcqa=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = cli.run() {
        let kind = ErrorKind::of(&err);
        tracing::error!("{kind} error: {err:#}");
        std::process::exit(kind.exit_code());
    }
    Ok(())
}
