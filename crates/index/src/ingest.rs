//! Ingestion path: chunk a document's text and index it for its owner.

use crate::canonical::ChunkStore;
use crate::mutation::{AddOutcome, MutationCoordinator};
use crate::types::{ChunkMetadata, ChunkRecord, Document};
use ragstore_core::{AppError, AppResult, IngestSettings};
use serde::Serialize;
use text_splitter::{ChunkConfig, TextSplitter};

/// A document to ingest.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub owner_id: String,
    pub file_id: String,
    pub original_name: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub file_id: String,
    pub chunks: usize,
    /// `None` when the text produced no chunks
    pub add: Option<AddOutcome>,
    /// Whether the chunk records reached the canonical store
    pub records_saved: bool,
    pub warning: Option<String>,
}

/// Split text into overlapping character-bounded chunks, dropping blank ones.
pub fn split_text(text: &str, settings: &IngestSettings) -> AppResult<Vec<String>> {
    let config = ChunkConfig::new(settings.chunk_size)
        .with_overlap(settings.chunk_overlap)
        .map_err(|e| AppError::Config(format!("Invalid chunking settings: {}", e)))?;
    let splitter = TextSplitter::new(config);

    let chunks: Vec<String> = splitter
        .chunks(text)
        .filter(|chunk| !chunk.trim().is_empty())
        .map(str::to_string)
        .collect();

    tracing::debug!(
        "Split {} bytes into {} chunks",
        text.len(),
        chunks.len()
    );
    Ok(chunks)
}

/// Chunk, index, then record a document.
///
/// Vectors go in first. If the canonical insert fails afterwards the
/// outcome says so instead of failing: the vectors are searchable but the
/// next rebuild will not include them.
pub async fn ingest_text(
    coordinator: &MutationCoordinator,
    chunk_store: &dyn ChunkStore,
    settings: &IngestSettings,
    request: &IngestRequest,
) -> AppResult<IngestOutcome> {
    let texts = split_text(&request.text, settings)?;
    if texts.is_empty() {
        tracing::info!("File '{}' has no text to index", request.file_id);
        return Ok(IngestOutcome {
            file_id: request.file_id.clone(),
            chunks: 0,
            add: None,
            records_saved: false,
            warning: None,
        });
    }

    let metadatas: Vec<ChunkMetadata> = (0..texts.len())
        .map(|i| {
            ChunkMetadata::new(&request.owner_id, &request.file_id, i as u32)
                .with_original_name(&request.original_name)
        })
        .collect();

    let records: Vec<ChunkRecord> = texts
        .iter()
        .zip(&metadatas)
        .map(|(text, meta)| ChunkRecord::new(meta, text.clone()))
        .collect();

    // Slots point at the record ids written below
    let documents = records
        .iter()
        .zip(&metadatas)
        .map(|(record, meta)| Document {
            metadata: meta.clone(),
            ..Document::from(record)
        })
        .collect();

    let add = coordinator
        .add_documents(&request.owner_id, documents)
        .await?;

    let (records_saved, warning) = match chunk_store.insert_many(&records) {
        Ok(_) => (true, None),
        Err(e) => {
            tracing::error!(
                "Indexed file '{}' for owner '{}' but failed to save chunk records: {}",
                request.file_id,
                request.owner_id,
                e
            );
            (
                false,
                Some(format!("vectors stored, chunk records not saved: {}", e)),
            )
        }
    };

    tracing::info!(
        "Ingested file '{}' for owner '{}': {} chunks",
        request.file_id,
        request.owner_id,
        texts.len()
    );

    Ok(IngestOutcome {
        file_id: request.file_id.clone(),
        chunks: texts.len(),
        add: Some(add),
        records_saved,
        warning,
    })
}
