use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::{signal, sync::watch};

use crate::media::Transcoder;
use crate::store::MediaStore;

#[derive(Parser, Debug)]
pub struct ServeCommand {
    /// HTTP server port
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Directory holding uploaded and processed files
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Transcoder binary to invoke
    #[arg(long, default_value = "ffmpeg")]
    pub ffmpeg: String,

    /// Prober binary to invoke
    #[arg(long, default_value = "ffprobe")]
    pub ffprobe: String,

    /// Maximum upload size in megabytes
    #[arg(long, default_value = "512")]
    pub max_upload_mb: usize,
}

impl Default for ServeCommand {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: PathBuf::from("data"),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            max_upload_mb: 512,
        }
    }
}

impl ServeCommand {
    pub async fn run(self) -> Result<()> {
        // Shutdown signal
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let store = Arc::new(MediaStore::open(&self.data_dir)?);
        let transcoder = Arc::new(Transcoder::new(&self.ffmpeg, &self.ffprobe));

        match transcoder.version().await {
            Some(version) => println!("Transcoder: {}", version),
            None => eprintln!(
                "Warning: '{}' not found on PATH; uploads will fail until it is installed",
                self.ffmpeg
            ),
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));

        println!();
        println!("HTTP server listening on http://localhost:{}", self.port);
        println!("  Uploads:   {}", store.upload_dir().display());
        println!("  Processed: {}", store.processed_dir().display());
        println!();

        let server_handle = {
            let store = Arc::clone(&store);
            let transcoder = Arc::clone(&transcoder);
            let max_upload_bytes = self.max_upload_mb * 1024 * 1024;
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                if let Err(e) = crate::server::run_server(
                    addr,
                    store,
                    transcoder,
                    max_upload_bytes,
                    shutdown_rx,
                )
                .await
                {
                    eprintln!("[server] Error: {}", e);
                }
            })
        };

        // Wait for Ctrl+C
        signal::ctrl_c().await?;
        println!("\nShutting down...");
        let _ = shutdown_tx.send(true);

        let _ = server_handle.await;

        println!("Done.");
        Ok(())
    }
}
