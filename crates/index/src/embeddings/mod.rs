//! Embedding providers.
//!
//! The index manager only sees the [`EmbeddingProvider`] trait; concrete
//! providers are chosen from configuration by [`create_provider`].

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
