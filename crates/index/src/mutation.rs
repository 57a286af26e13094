//! Mutation coordinator: adding texts to and deleting files from an
//! owner's index.
//!
//! Adds walk an ordered list of [`AddStage`]s. Each stage reports
//! [`StageOutcome::Applied`], [`StageOutcome::Unsupported`] or
//! [`StageOutcome::Failed`]; the first applied stage wins and failures are
//! logged before moving on. Every stage works on a copy of the cached
//! artifact, so a failed stage leaves nothing behind.

use crate::artifact::IndexArtifact;
use crate::registry::{OwnerGuard, StoreRegistry};
use crate::types::{validate_owner_id, ChunkMetadata, CountSource, Document};
use ragstore_core::{AppError, AppResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Strategies for getting new texts into an existing artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddStage {
    /// The owner had no data at all; the artifact was built from the new texts
    SeedBuild,
    /// Batch append into the existing index
    IncrementalAppend,
    /// One-by-one document inserts
    DocumentAppend,
    /// Rebuild from the artifact's own documents plus the new ones
    MergeRebuild,
    /// Rebuild from the canonical store plus the new documents
    CanonicalRebuild,
}

impl AddStage {
    /// Stages tried against an existing artifact, in order.
    pub const FALLBACK_ORDER: [AddStage; 4] = [
        AddStage::IncrementalAppend,
        AddStage::DocumentAppend,
        AddStage::MergeRebuild,
        AddStage::CanonicalRebuild,
    ];
}

/// Result of running one add stage.
#[derive(Debug)]
pub enum StageOutcome {
    Applied(IndexArtifact),
    Unsupported,
    Failed(AppError),
}

#[derive(Debug, Clone, Serialize)]
pub struct AddOutcome {
    /// Vector count after the add
    pub count: usize,
    /// How trustworthy `count` is
    pub count_source: CountSource,
    /// Stage that applied the add; `None` when there was nothing to add
    pub stage: Option<AddStage>,
    /// Whether the new artifact reached disk
    pub persisted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub removed: usize,
    pub remaining: usize,
    /// The owner had nothing left and was dropped from cache and disk
    pub evicted: bool,
    pub persisted: bool,
}

pub struct MutationCoordinator {
    registry: Arc<StoreRegistry>,
}

impl MutationCoordinator {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self { registry }
    }

    /// Add `texts` with their `metadatas` to `owner_id`'s index.
    ///
    /// The returned count is exact when the index reports its size;
    /// otherwise it is the docstore size or, as a last resort, the number
    /// of texts added (see [`CountSource`]).
    #[instrument(skip(self, texts, metadatas), fields(count = texts.len()))]
    pub async fn add_texts(
        &self,
        owner_id: &str,
        texts: &[String],
        metadatas: &[ChunkMetadata],
    ) -> AppResult<AddOutcome> {
        validate_owner_id(owner_id)?;
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
        self.add_documents(owner_id, documents).await
    }

    /// Add prepared documents to `owner_id`'s index.
    ///
    /// Document ids become the slot map entries, so callers that also
    /// write canonical records pass documents carrying those record ids.
    #[instrument(skip(self, documents), fields(count = documents.len()))]
    pub async fn add_documents(
        &self,
        owner_id: &str,
        documents: Vec<Document>,
    ) -> AppResult<AddOutcome> {
        validate_owner_id(owner_id)?;
        if let Some(doc) = documents.iter().find(|d| d.metadata.owner_id != owner_id) {
            return Err(AppError::InvalidInput(format!(
                "Metadata for file '{}' belongs to owner '{}', not '{}'",
                doc.metadata.file_id, doc.metadata.owner_id, owner_id
            )));
        }

        if documents.is_empty() {
            let (count, count_source) = match self.registry.cached(owner_id) {
                Some(handle) => handle.count_hint(0),
                None => (0, CountSource::Estimated),
            };
            return Ok(AddOutcome {
                count,
                count_source,
                stage: None,
                persisted: false,
            });
        }

        let added = documents.len();
        let guard = self.registry.lock_owner(owner_id).await;

        let current = match self.registry.get_or_create_locked(&guard, None).await {
            Ok((handle, _)) => handle,
            Err(AppError::NoStoreForOwner { .. }) => {
                let artifact = self
                    .registry
                    .builder()
                    .build_from_documents(documents)
                    .await?;
                info!("Cold start for owner '{}' with {} texts", owner_id, added);
                return Ok(self.finish(&guard, artifact, AddStage::SeedBuild, added));
            }
            Err(e @ AppError::Embedding(_)) => return Err(e),
            Err(e) => {
                return Err(AppError::AddFailed {
                    owner_id: owner_id.to_string(),
                    reason: format!("could not obtain the current index: {}", e),
                })
            }
        };

        // Embed once; every stage reuses these vectors
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let vectors = self.registry.builder().embedder().embed_batch(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(AppError::Embedding(format!(
                "Provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }

        let mut last_error = None;
        for stage in AddStage::FALLBACK_ORDER {
            match self
                .run_stage(stage, &guard, &current, &documents, &vectors)
                .await?
            {
                StageOutcome::Applied(artifact) => {
                    return Ok(self.finish(&guard, artifact, stage, added));
                }
                StageOutcome::Unsupported => {
                    debug!("Add stage {:?} not supported for owner '{}'", stage, owner_id);
                }
                StageOutcome::Failed(e) => {
                    warn!(
                        "Add stage {:?} failed for owner '{}', falling through: {}",
                        stage, owner_id, e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(AppError::AddFailed {
            owner_id: owner_id.to_string(),
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no add stage applied".to_string()),
        })
    }

    /// Run one stage. `Err` is reserved for failures no later stage could
    /// recover from: embedding failures and an unreadable canonical store.
    async fn run_stage(
        &self,
        stage: AddStage,
        guard: &OwnerGuard,
        current: &IndexArtifact,
        documents: &[Document],
        vectors: &[Vec<f32>],
    ) -> AppResult<StageOutcome> {
        let capabilities = current.index().capabilities();
        let builder = self.registry.builder();

        let outcome = match stage {
            AddStage::SeedBuild => StageOutcome::Unsupported,

            AddStage::IncrementalAppend => {
                if !capabilities.batch_append {
                    return Ok(StageOutcome::Unsupported);
                }
                let mut next = current.clone();
                match next.append_batch(vectors, documents.to_vec()) {
                    Ok(()) => StageOutcome::Applied(next),
                    Err(e) => StageOutcome::Failed(e),
                }
            }

            AddStage::DocumentAppend => {
                if !capabilities.single_insert {
                    return Ok(StageOutcome::Unsupported);
                }
                let mut next = current.clone();
                match next.insert_documents(vectors, documents.to_vec()) {
                    Ok(()) => StageOutcome::Applied(next),
                    Err(e) => StageOutcome::Failed(e),
                }
            }

            AddStage::MergeRebuild => match current.documents() {
                Ok(existing) => {
                    match builder
                        .build_merged(existing, documents.to_vec(), vectors)
                        .await
                    {
                        Ok(artifact) => StageOutcome::Applied(artifact),
                        Err(e @ AppError::Embedding(_)) => return Err(e),
                        Err(e) => StageOutcome::Failed(e),
                    }
                }
                Err(e) => StageOutcome::Failed(e),
            },

            AddStage::CanonicalRebuild => {
                let owner_id = guard.owner_id();
                let records = self
                    .registry
                    .chunks()
                    .find_by_owner(owner_id)
                    .map_err(|e| AppError::AddFailed {
                        owner_id: owner_id.to_string(),
                        reason: format!("canonical store read failed: {}", e),
                    })?;

                let existing = records.iter().map(Document::from).collect();
                match builder
                    .build_merged(existing, documents.to_vec(), vectors)
                    .await
                {
                    Ok(artifact) => StageOutcome::Applied(artifact),
                    Err(e @ AppError::Embedding(_)) => return Err(e),
                    Err(e) => StageOutcome::Failed(e),
                }
            }
        };

        Ok(outcome)
    }

    fn finish(
        &self,
        guard: &OwnerGuard,
        artifact: IndexArtifact,
        stage: AddStage,
        added: usize,
    ) -> AddOutcome {
        let (handle, persisted) = self.registry.publish(guard, artifact);
        let (count, count_source) = handle.count_hint(added);

        info!(
            "Added {} texts for owner '{}' via {:?}, count now {} ({:?})",
            added,
            guard.owner_id(),
            stage,
            count,
            count_source
        );

        AddOutcome {
            count,
            count_source,
            stage: Some(stage),
            persisted,
        }
    }

    /// Delete every record of `file_id` for `owner_id` and rebuild the
    /// owner's index from what remains.
    ///
    /// The canonical delete happens first and is never undone. If the
    /// rebuild afterwards fails, or an emptied owner's directory cannot be
    /// removed, the result is [`AppError::DeletePartial`] and the previous
    /// artifact stays in place.
    #[instrument(skip(self))]
    pub async fn delete_file(&self, owner_id: &str, file_id: &str) -> AppResult<DeleteOutcome> {
        validate_owner_id(owner_id)?;

        let guard = self.registry.lock_owner(owner_id).await;
        let chunks = self.registry.chunks();

        if chunks.find_by_file(owner_id, file_id)?.is_empty() {
            debug!(
                "No records of file '{}' for owner '{}', nothing to delete",
                file_id, owner_id
            );
            return Ok(DeleteOutcome {
                removed: 0,
                remaining: chunks.count_by_owner(owner_id)?,
                evicted: false,
                persisted: false,
            });
        }

        let previous_total = chunks.count_by_owner(owner_id)?;
        let deleted = chunks.delete_by_file(owner_id, file_id)?;

        let partial = |reason: String| AppError::DeletePartial {
            owner_id: owner_id.to_string(),
            file_id: file_id.to_string(),
            records_removed: deleted,
            reason,
        };

        let remaining = chunks
            .find_by_owner(owner_id)
            .map_err(|e| partial(format!("could not re-read remaining records: {}", e)))?;

        if remaining.is_empty() {
            // A directory left on disk would be loaded again, so it must go
            // before the cached handle does
            self.registry
                .layout()
                .remove(owner_id)
                .map_err(|e| partial(format!("could not remove persisted index: {}", e)))?;
            self.registry.evict(&guard);
            info!(
                "Owner '{}' has no records left after deleting file '{}'",
                owner_id, file_id
            );
            return Ok(DeleteOutcome {
                removed: previous_total,
                remaining: 0,
                evicted: true,
                persisted: false,
            });
        }

        let artifact = self
            .registry
            .builder()
            .build_from_records(&remaining)
            .await
            .map_err(|e| partial(format!("rebuild failed: {}", e)))?;
        let (_, persisted) = self.registry.publish(&guard, artifact);

        let removed = previous_total.saturating_sub(remaining.len());
        info!(
            "Deleted file '{}' for owner '{}': {} removed, {} remaining",
            file_id,
            owner_id,
            removed,
            remaining.len()
        );

        Ok(DeleteOutcome {
            removed,
            remaining: remaining.len(),
            evicted: false,
            persisted,
        })
    }
}
