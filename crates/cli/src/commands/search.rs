//! Search command handler.
//!
//! Prints matches the way they are handed to an answer-generation stage:
//! one citation line per hit followed by the chunk text.

use clap::Args;
use ragstore_index::{IndexManager, SearchOutcome};

/// Longest chunk excerpt included in the assembled context.
const MAX_CONTEXT_CHARS: usize = 1200;

const NO_DATA_MESSAGE: &str = "No answer found in your data";

/// Search an owner's index
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Owner to search
    pub owner: String,

    /// Query text
    pub query: String,

    /// Number of matches to return (default: index.defaultTopK)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchCommand {
    pub async fn execute(&self, manager: &IndexManager) -> anyhow::Result<()> {
        tracing::info!("Executing search command for owner '{}'", self.owner);

        let outcome = manager.search(&self.owner, &self.query, self.top_k).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            return Ok(());
        }

        println!("{}", assemble_context(&outcome));
        Ok(())
    }
}

/// Render hits as citation blocks separated by blank lines.
pub fn assemble_context(outcome: &SearchOutcome) -> String {
    let hits = outcome.hits();
    if outcome.is_no_data() || hits.is_empty() {
        return NO_DATA_MESSAGE.to_string();
    }

    let mut blocks: Vec<String> = hits
        .iter()
        .map(|hit| format!("{}\n{}", hit.citation(), excerpt(&hit.document.text)))
        .collect();

    if let SearchOutcome::Matches { degraded: true, .. } = outcome {
        blocks.push("(some matches could not be mapped back to their source)".to_string());
    }

    blocks.join("\n\n")
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(MAX_CONTEXT_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
