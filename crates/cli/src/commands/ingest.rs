//! Ingest command handler.
//!
//! Plays the upload path: read a text file, chunk it, and index it for an
//! owner.

use anyhow::Context;
use clap::Args;
use ragstore_index::{IndexManager, IngestRequest};
use std::path::PathBuf;

/// Chunk a text file and add it to an owner's index
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Owner the document belongs to
    pub owner: String,

    /// Path to a UTF-8 text file
    pub path: PathBuf,

    /// File id to record (default: the file name without extension)
    #[arg(long)]
    pub file_id: Option<String>,

    /// Display name used in citations (default: the file name)
    #[arg(long)]
    pub name: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, manager: &IndexManager) -> anyhow::Result<()> {
        tracing::info!("Executing ingest command for owner '{}'", self.owner);

        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        let file_id = self
            .file_id
            .clone()
            .unwrap_or_else(|| default_file_id(&self.path));
        let original_name = self.name.clone().unwrap_or_else(|| {
            self.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        let outcome = manager
            .ingest(&IngestRequest {
                owner_id: self.owner.clone(),
                file_id,
                original_name,
                text,
            })
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            return Ok(());
        }

        match &outcome.add {
            None => println!("Nothing to index in {}", self.path.display()),
            Some(add) => println!(
                "Indexed {} chunks as file '{}'; owner '{}' now has {} vectors{}",
                outcome.chunks,
                outcome.file_id,
                self.owner,
                add.count,
                if add.persisted { "" } else { " (not persisted)" }
            ),
        }
        if let Some(warning) = &outcome.warning {
            eprintln!("Warning: {}", warning);
        }

        Ok(())
    }
}

fn default_file_id(path: &std::path::Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "file".to_string())
}
