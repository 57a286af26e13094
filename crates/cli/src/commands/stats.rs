//! Stats command handler.

use clap::Args;
use ragstore_index::IndexManager;

/// Show an owner's store diagnostics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Owner to inspect
    pub owner: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub fn execute(&self, manager: &IndexManager) -> anyhow::Result<()> {
        tracing::info!("Executing stats command for owner '{}'", self.owner);

        let stats = manager.stats(&self.owner)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
            return Ok(());
        }

        let count = |n: Option<usize>| n.map_or_else(|| "-".to_string(), |n| n.to_string());

        println!("Owner:       {}", stats.owner_id);
        println!("Loaded:      {}", stats.is_loaded);
        println!("On disk:     {}", stats.on_disk_exists);
        println!("Vectors:     {}", count(stats.vector_count));
        println!("Documents:   {}", count(stats.docstore_count));
        for doc in &stats.sample {
            let preview: String = doc.text.chars().take(80).collect();
            println!(
                "  [{} #{}] {}",
                doc.metadata.file_id, doc.metadata.chunk_index, preview
            );
        }

        Ok(())
    }
}
