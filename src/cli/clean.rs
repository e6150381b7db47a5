use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::store::MediaStore;

#[derive(Parser, Debug)]
pub struct CleanCommand {
    /// Directory holding uploaded and processed files
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,
}

impl CleanCommand {
    pub async fn run(self) -> Result<()> {
        if !self.data_dir.exists() {
            println!("Nothing to clean: {} does not exist", self.data_dir.display());
            return Ok(());
        }

        let store = MediaStore::open(&self.data_dir)?;
        let (uploads, processed) = store.clear_all()?;

        println!(
            "Removed {} uploaded and {} processed file(s) from {}",
            uploads,
            processed,
            self.data_dir.display()
        );
        Ok(())
    }
}
