//! Ragstore Core Library
//!
//! This crate provides the foundational utilities shared by the index
//! manager and the CLI:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, EmbeddingSettings, IndexSettings, IngestSettings};
pub use error::{AppError, AppResult};
