//! Hyla - execution core of a hybrid UTXO and account chain.

use clap::Parser;
use eyre::Result;

mod cli;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt().with_env_filter(if cli.verbose { "debug" } else { "info" }).init();

    tracing::info!("Starting hyla");

    cli.run()
}
