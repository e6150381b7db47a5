use anyhow::Result;
use clap::{Parser, Subcommand};

mod clean;
mod probe;
mod serve;

pub use clean::CleanCommand;
pub use probe::ProbeCommand;
pub use serve::ServeCommand;

#[derive(Parser, Debug)]
#[command(name = "vidpress")]
#[command(about = "Web front-end for ffmpeg-based video compression, conversion and merging")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (default)
    Serve(ServeCommand),
    /// Print media info for a local file and exit
    Probe(ProbeCommand),
    /// Delete stored uploads and processed outputs
    Clean(CleanCommand),
}

impl Args {
    pub async fn run(self) -> Result<()> {
        let command = self
            .command
            .unwrap_or(Command::Serve(ServeCommand::default()));

        match command {
            Command::Serve(cmd) => cmd.run().await,
            Command::Probe(cmd) => cmd.run().await,
            Command::Clean(cmd) => cmd.run().await,
        }
    }
}
