use anyhow::Result;
use clap::Parser;
use detectctl::{cli, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    logging::init(!args.headless());
    cli::run(args).await
}
