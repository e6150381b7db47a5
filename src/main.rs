use anyhow::Result;
use clap::Parser;

mod cli;
mod media;
mod server;
mod store;

#[tokio::main]
async fn main() -> Result<()> {
    cli::Args::parse().run().await
}
