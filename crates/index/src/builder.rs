//! Index builder: turns texts or records into a fresh artifact.

use crate::artifact::{Docstore, IndexArtifact};
use crate::embeddings::EmbeddingProvider;
use crate::slot_map::SlotMap;
use crate::types::{ChunkMetadata, ChunkRecord, Document};
use crate::vector_index::{FlatIndex, VectorIndex};
use ragstore_core::{AppError, AppResult};
use std::sync::Arc;
use tracing::instrument;

/// Builds artifacts with one batch embedding call per build.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Build from parallel `texts` and `metadatas`.
    ///
    /// Empty input gives an empty index. Provider failures propagate as
    /// [`AppError::Embedding`].
    pub async fn build_from_texts(
        &self,
        texts: &[String],
        metadatas: &[ChunkMetadata],
    ) -> AppResult<IndexArtifact> {
        if texts.len() != metadatas.len() {
            return Err(AppError::InvalidInput(format!(
                "Got {} texts but {} metadatas",
                texts.len(),
                metadatas.len()
            )));
        }

        let documents = texts
            .iter()
            .zip(metadatas)
            .map(|(text, meta)| Document::new(text.clone(), meta.clone()))
            .collect();

        self.build_from_documents(documents).await
    }

    /// Build from canonical records, keeping their ids as docstore ids.
    pub async fn build_from_records(&self, records: &[ChunkRecord]) -> AppResult<IndexArtifact> {
        self.build_from_documents(records.iter().map(Document::from).collect())
            .await
    }

    #[instrument(skip(self, documents), fields(count = documents.len()))]
    pub async fn build_from_documents(&self, documents: Vec<Document>) -> AppResult<IndexArtifact> {
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        self.assemble(documents, &vectors)
    }

    /// Build from documents whose vectors are already known for a suffix.
    ///
    /// Only `existing` is embedded; `new_vectors` belong to `new_documents`.
    pub async fn build_merged(
        &self,
        existing: Vec<Document>,
        new_documents: Vec<Document>,
        new_vectors: &[Vec<f32>],
    ) -> AppResult<IndexArtifact> {
        let texts: Vec<String> = existing.iter().map(|d| d.text.clone()).collect();
        let mut vectors = self.embedder.embed_batch(&texts).await?;
        vectors.extend_from_slice(new_vectors);

        let mut documents = existing;
        documents.extend(new_documents);
        self.assemble(documents, &vectors)
    }

    fn assemble(&self, documents: Vec<Document>, vectors: &[Vec<f32>]) -> AppResult<IndexArtifact> {
        if vectors.len() != documents.len() {
            return Err(AppError::Embedding(format!(
                "Provider returned {} vectors for {} texts",
                vectors.len(),
                documents.len()
            )));
        }

        let dimensions = self.embedder.dimensions();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
            return Err(AppError::Embedding(format!(
                "Provider returned a {}-dimension vector, expected {}",
                bad.len(),
                dimensions
            )));
        }

        let mut index = FlatIndex::new(dimensions);
        index.append_batch(vectors)?;

        let mut slots = SlotMap::new();
        for doc in &documents {
            slots.push(doc.id.clone());
        }

        tracing::debug!("Built flat index with {} vectors", index.len());

        Ok(
            IndexArtifact::new(Box::new(index), slots, Docstore::from_documents(documents))
                .with_embedder(self.embedder.clone()),
        )
    }
}
