//! Index manager type definitions.

use chrono::{DateTime, Utc};
use ragstore_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Provenance carried by every indexed chunk.
///
/// Field names follow the wire format shared with the ingestion path
/// (`fileId`, `ownerId`, `chunkIndex`, `originalName`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    /// File the chunk was cut from
    pub file_id: String,

    /// Tenant partition key
    pub owner_id: String,

    /// Position of the chunk within its file
    pub chunk_index: u32,

    /// Display name of the uploaded file, if known
    #[serde(default)]
    pub original_name: String,
}

impl ChunkMetadata {
    pub fn new(owner_id: impl Into<String>, file_id: impl Into<String>, chunk_index: u32) -> Self {
        Self {
            file_id: file_id.into(),
            owner_id: owner_id.into(),
            chunk_index,
            original_name: String::new(),
        }
    }

    pub fn with_original_name(mut self, name: impl Into<String>) -> Self {
        self.original_name = name.into();
        self
    }
}

/// A canonical chunk record as stored in the chunk store.
///
/// Identity within an owner is `(file_id, chunk_index)`; `id` is a globally
/// unique surrogate. Records are never updated, only deleted per file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub id: String,
    pub file_id: String,
    pub owner_id: String,
    pub chunk_index: u32,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl ChunkRecord {
    /// Create a record with a fresh surrogate id.
    pub fn new(metadata: &ChunkMetadata, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_id: metadata.file_id.clone(),
            owner_id: metadata.owner_id.clone(),
            chunk_index: metadata.chunk_index,
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata::new(&self.owner_id, &self.file_id, self.chunk_index)
    }
}

/// A docstore entry: the text and provenance behind one vector slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Docstore id, referenced from the slot map
    pub id: String,

    /// Chunk text
    pub text: String,

    pub metadata: ChunkMetadata,
}

impl Document {
    pub fn new(text: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            metadata,
        }
    }

    /// Placeholder used when a slot cannot be resolved to any record.
    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn is_placeholder(&self) -> bool {
        self.id.is_empty() && self.text.is_empty()
    }
}

impl From<&ChunkRecord> for Document {
    fn from(record: &ChunkRecord) -> Self {
        Self {
            id: record.id.clone(),
            text: record.text.clone(),
            metadata: record.metadata(),
        }
    }
}

/// How a vector slot was mapped back to its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotResolution {
    /// Found through the slot map
    Mapped,
    /// Slot map had no entry; docstore insertion order was used
    Positional,
    /// Neither resolved; the document is an empty placeholder
    Unresolved,
}

/// One ranked search match.
///
/// `score` is the raw distance reported by the index (squared L2 for the
/// flat index): lower is closer. It is never renormalized.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document: Document,
    pub score: f32,
    pub resolution: SlotResolution,
}

impl SearchHit {
    /// Human-readable citation line used when assembling answer context.
    pub fn citation(&self) -> String {
        let title = if self.document.metadata.original_name.is_empty() {
            "unknown"
        } else {
            self.document.metadata.original_name.as_str()
        };
        format!(
            "From {} (chunk {}, score {:.3})",
            title, self.document.metadata.chunk_index, self.score
        )
    }
}

/// Which search path produced the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPath {
    /// The artifact's own scored similarity search
    Primary,
    /// Raw nearest-neighbor scan with lenient slot resolution
    Fallback,
}

/// Caller-facing search result.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    /// The owner has no cached, persisted, or canonical data
    NoData,
    Matches {
        hits: Vec<SearchHit>,
        path: SearchPath,
        /// True when at least one slot was not resolved through the slot map
        degraded: bool,
    },
}

impl SearchOutcome {
    pub fn hits(&self) -> &[SearchHit] {
        match self {
            SearchOutcome::NoData => &[],
            SearchOutcome::Matches { hits, .. } => hits,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, SearchOutcome::NoData)
    }
}

/// Where a post-add vector count came from.
///
/// Index types that cannot report their size fall back to the docstore
/// size, and failing that to the number of texts just added. The last
/// case is an estimate, not an exact count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CountSource {
    Exact,
    Docstore,
    Estimated,
}

/// Diagnostic snapshot of one owner's store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub owner_id: String,
    pub is_loaded: bool,
    pub on_disk_exists: bool,
    pub vector_count: Option<usize>,
    pub docstore_count: Option<usize>,
    pub sample: Vec<Document>,
}

/// Reject owner ids that cannot be used as a directory key.
pub fn validate_owner_id(owner_id: &str) -> AppResult<()> {
    if owner_id.trim().is_empty()
        || owner_id == "."
        || owner_id == ".."
        || owner_id.contains(std::path::is_separator)
        || owner_id.contains('\0')
    {
        return Err(AppError::InvalidInput(format!(
            "Invalid owner id: {:?}",
            owner_id
        )));
    }
    Ok(())
}
