//! Loaded command handler.

use clap::Args;
use ragstore_index::IndexManager;

/// List owners with a loaded index
#[derive(Args, Debug)]
pub struct LoadedCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl LoadedCommand {
    pub fn execute(&self, manager: &IndexManager) -> anyhow::Result<()> {
        let owners = manager.list_loaded_owners();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&owners)?);
        } else if owners.is_empty() {
            println!("No owners loaded");
        } else {
            for owner in owners {
                println!("{}", owner);
            }
        }

        Ok(())
    }
}
