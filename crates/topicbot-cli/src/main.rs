mod bootstrap_helpers;
mod cli_args;
mod console_transport;
mod startup;

use anyhow::Result;
use clap::Parser;

use crate::{bootstrap_helpers::init_tracing, cli_args::Cli, startup::run_cli};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_cli(cli).await
}
