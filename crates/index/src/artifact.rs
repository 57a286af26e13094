//! In-memory index artifact: vectors, slot map, and docstore for one owner.

use crate::embeddings::EmbeddingProvider;
use crate::slot_map::SlotMap;
use crate::types::{CountSource, Document, SlotResolution};
use crate::vector_index::{Neighbor, VectorIndex};
use ragstore_core::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Documents in insertion order with an id lookup.
#[derive(Debug, Clone, Default)]
pub struct Docstore {
    documents: Vec<Document>,
    positions: HashMap<String, usize>,
}

impl Docstore {
    pub fn from_documents(documents: Vec<Document>) -> Self {
        let positions = documents
            .iter()
            .enumerate()
            .map(|(pos, doc)| (doc.id.clone(), pos))
            .collect();
        Self {
            documents,
            positions,
        }
    }

    pub fn push(&mut self, document: Document) {
        self.positions
            .insert(document.id.clone(), self.documents.len());
        self.documents.push(document);
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.positions.get(id).map(|&pos| &self.documents[pos])
    }

    /// Document at an insertion position.
    pub fn at(&self, position: usize) -> Option<&Document> {
        self.documents.get(position)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }
}

/// A searchable index for one owner plus everything needed to turn a
/// vector slot back into text and citation metadata.
///
/// Artifacts are immutable once published. Mutations work on a clone and
/// the registry swaps the finished clone in.
#[derive(Debug, Clone)]
pub struct IndexArtifact {
    index: Box<dyn VectorIndex>,
    slots: SlotMap,
    docstore: Docstore,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl IndexArtifact {
    pub fn new(index: Box<dyn VectorIndex>, slots: SlotMap, docstore: Docstore) -> Self {
        Self {
            index,
            slots,
            docstore,
            embedder: None,
        }
    }

    /// Attach the provider used by the scored search path.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    pub fn slots(&self) -> &SlotMap {
        &self.slots
    }

    pub fn docstore(&self) -> &Docstore {
        &self.docstore
    }

    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }

    /// Exact vector count, when the index reports one.
    pub fn vector_count(&self) -> Option<usize> {
        self.index.ntotal()
    }

    /// True when there is nothing to search.
    pub fn is_empty(&self) -> bool {
        match self.index.ntotal() {
            Some(n) => n == 0,
            None => self.docstore.is_empty(),
        }
    }

    /// Best available vector count.
    ///
    /// Falls back to the docstore size, then to `fallback`, which callers
    /// pass as the number of texts just added. Only the first source is
    /// exact.
    pub fn count_hint(&self, fallback: usize) -> (usize, CountSource) {
        if self.index.capabilities().reports_count {
            if let Some(n) = self.index.ntotal() {
                return (n, CountSource::Exact);
            }
        }
        if !self.docstore.is_empty() {
            return (self.docstore.len(), CountSource::Docstore);
        }
        (fallback, CountSource::Estimated)
    }

    pub fn supports_scored_search(&self) -> bool {
        self.embedder.is_some()
    }

    /// Every document in slot order.
    ///
    /// Fails when the slot map does not cover the index exactly or points
    /// at an id missing from the docstore.
    pub fn documents(&self) -> AppResult<Vec<Document>> {
        let total = self.index.ntotal().unwrap_or(self.slots.len());
        if self.slots.len() != total {
            return Err(AppError::Other(format!(
                "Slot map covers {} of {} vectors",
                self.slots.len(),
                total
            )));
        }

        self.slots
            .ids()
            .enumerate()
            .map(|(slot, id)| {
                self.docstore.get(id).cloned().ok_or_else(|| {
                    AppError::Other(format!("Slot {} maps to unknown document '{}'", slot, id))
                })
            })
            .collect()
    }

    /// Up to `n` documents in insertion order.
    pub fn sample(&self, n: usize) -> Vec<Document> {
        self.docstore.documents().iter().take(n).cloned().collect()
    }

    /// Embed `query` and return the `k` closest documents with their raw
    /// distance. Every returned slot must map cleanly.
    pub async fn similarity_search_with_score(
        &self,
        query: &str,
        k: usize,
    ) -> AppResult<Vec<(Document, f32)>> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| AppError::Other("Artifact has no embedding provider".to_string()))?;

        let query_vector = embedder.embed(query).await?;
        let neighbors = self.index.search(&query_vector, k)?;

        neighbors
            .into_iter()
            .filter(|n| !n.is_none())
            .map(|n| {
                let slot = n.slot as usize;
                self.slots
                    .id_for(slot)
                    .and_then(|id| self.docstore.get(id))
                    .map(|doc| (doc.clone(), n.distance))
                    .ok_or_else(|| AppError::Other(format!("Slot {} is not mapped", slot)))
            })
            .collect()
    }

    /// Nearest-neighbor scan over the underlying index.
    pub fn raw_search(&self, query_vector: &[f32], k: usize) -> AppResult<Vec<Neighbor>> {
        self.index.search(query_vector, k)
    }

    /// Resolve a slot through the slot map, then by docstore position, then
    /// to a placeholder. Never fails.
    pub fn resolve_slot(&self, slot: usize) -> (Document, SlotResolution) {
        if let Some(doc) = self.slots.id_for(slot).and_then(|id| self.docstore.get(id)) {
            return (doc.clone(), SlotResolution::Mapped);
        }
        if let Some(doc) = self.docstore.at(slot) {
            return (doc.clone(), SlotResolution::Positional);
        }
        (Document::placeholder(), SlotResolution::Unresolved)
    }

    fn check_aligned(&self) -> AppResult<()> {
        if let Some(total) = self.index.ntotal() {
            if total != self.slots.len() {
                return Err(AppError::Other(format!(
                    "Slot map covers {} of {} vectors",
                    self.slots.len(),
                    total
                )));
            }
        }
        Ok(())
    }

    /// Append pre-embedded documents in one batch.
    pub fn append_batch(&mut self, vectors: &[Vec<f32>], documents: Vec<Document>) -> AppResult<()> {
        if vectors.len() != documents.len() {
            return Err(AppError::InvalidInput(format!(
                "{} vectors for {} documents",
                vectors.len(),
                documents.len()
            )));
        }
        self.check_aligned()?;
        self.index.append_batch(vectors)?;

        for doc in documents {
            self.slots.push(doc.id.clone());
            self.docstore.push(doc);
        }
        Ok(())
    }

    /// Insert pre-embedded documents one at a time.
    pub fn insert_documents(
        &mut self,
        vectors: &[Vec<f32>],
        documents: Vec<Document>,
    ) -> AppResult<()> {
        if vectors.len() != documents.len() {
            return Err(AppError::InvalidInput(format!(
                "{} vectors for {} documents",
                vectors.len(),
                documents.len()
            )));
        }
        self.check_aligned()?;

        for (vector, doc) in vectors.iter().zip(documents) {
            let slot = self.index.insert(vector)?;
            if slot != self.slots.len() {
                return Err(AppError::Other(format!(
                    "Index assigned slot {}, expected {}",
                    slot,
                    self.slots.len()
                )));
            }
            self.slots.push(doc.id.clone());
            self.docstore.push(doc);
        }
        Ok(())
    }

    /// Split into the parts persistence writes.
    pub(crate) fn parts(&self) -> (&dyn VectorIndex, &SlotMap, &Docstore) {
        (self.index.as_ref(), &self.slots, &self.docstore)
    }
}
