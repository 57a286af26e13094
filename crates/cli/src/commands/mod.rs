//! Command handlers for the ragstore CLI.
//!
//! Each subcommand stands in for one upstream caller of the index
//! manager: ingestion, deletion, querying, and diagnostics.

pub mod delete;
pub mod explain;
pub mod ingest;
pub mod loaded;
pub mod search;
pub mod stats;

// Re-export command types for convenience
pub use delete::DeleteCommand;
pub use explain::ExplainCommand;
pub use ingest::IngestCommand;
pub use loaded::LoadedCommand;
pub use search::SearchCommand;
pub use stats::StatsCommand;
