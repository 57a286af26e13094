//! Delete command handler.

use clap::Args;
use ragstore_index::IndexManager;

/// Delete a file's chunks and rebuild the owner's index
#[derive(Args, Debug)]
pub struct DeleteCommand {
    /// Owner the file belongs to
    pub owner: String,

    /// File id given at ingest time
    pub file_id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl DeleteCommand {
    pub async fn execute(&self, manager: &IndexManager) -> anyhow::Result<()> {
        tracing::info!(
            "Executing delete command for file '{}' of owner '{}'",
            self.file_id,
            self.owner
        );

        // A DeletePartial error means the records are gone and only the index lags
        let outcome = manager.delete_file(&self.owner, &self.file_id).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        } else if outcome.removed == 0 {
            println!("No chunks of file '{}' found for owner '{}'", self.file_id, self.owner);
        } else if outcome.evicted {
            println!(
                "Removed {} chunks; owner '{}' has no data left",
                outcome.removed, self.owner
            );
        } else {
            println!(
                "Removed {} chunks; {} remain for owner '{}'",
                outcome.removed, outcome.remaining, self.owner
            );
        }

        Ok(())
    }
}
