//! Concrete embedding provider implementations.

pub mod mock;
pub mod ollama;
