use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use crate::media::probe_media;

#[derive(Parser, Debug)]
pub struct ProbeCommand {
    /// Media file to inspect
    pub file: PathBuf,

    /// Prober binary to invoke
    #[arg(long, default_value = "ffprobe")]
    pub ffprobe: String,
}

impl ProbeCommand {
    pub async fn run(self) -> Result<()> {
        if !self.file.exists() {
            bail!("No such file: {}", self.file.display());
        }

        let info = probe_media(&self.ffprobe, &self.file)
            .await
            .with_context(|| format!("Failed to probe {}", self.file.display()))?;

        println!("File:     {}", self.file.display());
        println!("Format:   {}", info.format_name);
        match info.duration {
            Some(duration) => println!("Duration: {:.2}s", duration.as_secs_f64()),
            None => println!("Duration: unknown"),
        }
        match info.size {
            Some(size) => println!("Size:     {} bytes", size),
            None => println!("Size:     unknown"),
        }

        Ok(())
    }
}
