use anyhow::Result;
use clap::Parser;
use perch_bot::bootstrap::{init_tracing, run};
use perch_bot::config::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run(cli).await
}
