use anyhow::Result;
use clap::Parser;
use datachat_ai::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    datachat_ai::run(args).await
}
