//! Owner-partitioned vector index manager.
//!
//! Keeps one searchable index per owner, consistent with a canonical chunk
//! store: loads persisted indexes, builds and rebuilds them, applies adds
//! and file deletions under a per-owner lock, and answers similarity
//! queries with a degraded fallback path.

pub mod artifact;
pub mod builder;
pub mod canonical;
pub mod embeddings;
pub mod ingest;
pub mod mutation;
pub mod persist;
pub mod registry;
pub mod search;
pub mod slot_map;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use artifact::IndexArtifact;
pub use builder::IndexBuilder;
pub use canonical::{ChunkStore, SqliteChunkStore};
pub use embeddings::{create_provider, EmbeddingProvider};
pub use ingest::{IngestOutcome, IngestRequest};
pub use mutation::{AddOutcome, AddStage, DeleteOutcome, MutationCoordinator};
pub use persist::ArtifactLayout;
pub use registry::{StoreRegistry, StoreSource};
pub use search::{SearchEngine, SearchTrace};
pub use types::{
    ChunkMetadata, ChunkRecord, CountSource, Document, SearchHit, SearchOutcome, SearchPath,
    SlotResolution, StoreStats,
};

use ragstore_core::{AppConfig, AppResult, IngestSettings};
use std::sync::Arc;

/// Everything the front ends need, wired together.
pub struct IndexManager {
    registry: Arc<StoreRegistry>,
    mutations: MutationCoordinator,
    engine: SearchEngine,
    ingest_settings: IngestSettings,
    default_top_k: usize,
}

impl IndexManager {
    /// Open the manager described by `config`: embedding provider, chunk
    /// store, artifact layout. Loads every persisted owner when
    /// `index.eager_load` is set.
    pub async fn open(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;

        let embedder = create_provider(&config.embedding).await?;
        let chunks = SqliteChunkStore::open(&config.chunk_db_path())?;

        let manager = Self::with_parts(
            ArtifactLayout::from_config(config),
            embedder,
            Arc::new(chunks),
        )
        .with_ingest_settings(config.ingest.clone())
        .with_default_top_k(config.index.default_top_k);

        if config.index.eager_load {
            manager.registry.load_all().await;
        }

        tracing::info!(
            "Index manager ready: {} owners loaded from {}",
            manager.registry.list_loaded_owners().len(),
            manager.registry.layout().root().display()
        );

        Ok(manager)
    }

    pub fn with_parts(
        layout: ArtifactLayout,
        embedder: Arc<dyn EmbeddingProvider>,
        chunks: Arc<dyn ChunkStore>,
    ) -> Self {
        let registry = Arc::new(StoreRegistry::new(
            layout,
            IndexBuilder::new(embedder),
            chunks,
        ));

        Self {
            mutations: MutationCoordinator::new(registry.clone()),
            engine: SearchEngine::new(registry.clone()),
            registry,
            ingest_settings: IngestSettings::default(),
            default_top_k: ragstore_core::IndexSettings::default().default_top_k,
        }
    }

    pub fn with_ingest_settings(mut self, settings: IngestSettings) -> Self {
        self.ingest_settings = settings;
        self
    }

    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    pub fn chunk_store(&self) -> &Arc<dyn ChunkStore> {
        self.registry.chunks()
    }

    pub async fn add_texts(
        &self,
        owner_id: &str,
        texts: &[String],
        metadatas: &[ChunkMetadata],
    ) -> AppResult<AddOutcome> {
        self.mutations.add_texts(owner_id, texts, metadatas).await
    }

    /// Add documents whose ids the caller controls, e.g. canonical record ids.
    pub async fn add_documents(
        &self,
        owner_id: &str,
        documents: Vec<Document>,
    ) -> AppResult<AddOutcome> {
        self.mutations.add_documents(owner_id, documents).await
    }

    pub async fn delete_file(&self, owner_id: &str, file_id: &str) -> AppResult<DeleteOutcome> {
        self.mutations.delete_file(owner_id, file_id).await
    }

    /// Chunk and index a document, then record its chunks canonically.
    pub async fn ingest(&self, request: &IngestRequest) -> AppResult<IngestOutcome> {
        ingest::ingest_text(
            &self.mutations,
            self.registry.chunks().as_ref(),
            &self.ingest_settings,
            request,
        )
        .await
    }

    /// Search with `top_k`, or the configured default when `None`.
    pub async fn search(
        &self,
        owner_id: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> AppResult<SearchOutcome> {
        self.engine
            .search(owner_id, query, top_k.unwrap_or(self.default_top_k))
            .await
    }

    pub async fn explain(
        &self,
        owner_id: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> AppResult<SearchTrace> {
        self.engine
            .explain(owner_id, query, top_k.unwrap_or(self.default_top_k))
            .await
    }

    pub fn stats(&self, owner_id: &str) -> AppResult<StoreStats> {
        self.registry.stats(owner_id)
    }

    pub fn list_loaded_owners(&self) -> Vec<String> {
        self.registry.list_loaded_owners()
    }
}
