//! Explain command handler.

use clap::Args;
use ragstore_index::IndexManager;

/// Search and print every step taken
#[derive(Args, Debug)]
pub struct ExplainCommand {
    /// Owner to search
    pub owner: String,

    /// Query text
    pub query: String,

    /// Number of matches to return (default: index.defaultTopK)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,
}

impl ExplainCommand {
    pub async fn execute(&self, manager: &IndexManager) -> anyhow::Result<()> {
        tracing::info!("Executing explain command for owner '{}'", self.owner);

        let trace = manager.explain(&self.owner, &self.query, self.top_k).await?;
        println!("{}", serde_json::to_string_pretty(&trace)?);

        Ok(())
    }
}
