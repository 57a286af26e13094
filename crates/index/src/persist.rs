//! On-disk layout of index artifacts.
//!
//! Each owner gets one directory, `<vectors_dir>/<prefix><owner_id>`,
//! holding `index.bin` (the serialized vector index) and `docstore.json`
//! (slot map plus documents). Both files are written under a temporary
//! name and renamed into place.

use crate::artifact::{Docstore, IndexArtifact};
use crate::slot_map::SlotMap;
use crate::types::Document;
use crate::vector_index::FlatIndex;
use ragstore_core::{AppConfig, AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const INDEX_FILE: &str = "index.bin";
const DOCSTORE_FILE: &str = "docstore.json";
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct DocstoreFileRef<'a> {
    format_version: u32,
    index_kind: &'a str,
    slots: &'a SlotMap,
    documents: &'a [Document],
}

#[derive(Deserialize)]
struct DocstoreFile {
    format_version: u32,
    index_kind: String,
    slots: SlotMap,
    documents: Vec<Document>,
}

/// Where owner artifacts live on disk.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
    prefix: String,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.vectors_dir(), config.index.namespace_prefix.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn owner_dir(&self, owner_id: &str) -> PathBuf {
        self.root.join(format!("{}{}", self.prefix, owner_id))
    }

    /// True when the owner directory exists and holds anything.
    pub fn exists(&self, owner_id: &str) -> bool {
        dir_has_entries(&self.owner_dir(owner_id))
    }

    /// Write an artifact, replacing any previous one.
    pub fn save(&self, owner_id: &str, artifact: &IndexArtifact) -> AppResult<()> {
        let dir = self.owner_dir(owner_id);
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::Persist(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let (index, slots, docstore) = artifact.parts();

        let index_bytes = index.to_bytes()?;
        write_atomic(&dir.join(INDEX_FILE), &index_bytes)?;

        let docstore_json = serde_json::to_vec(&DocstoreFileRef {
            format_version: FORMAT_VERSION,
            index_kind: index.kind(),
            slots,
            documents: docstore.documents(),
        })
        .map_err(|e| AppError::Persist(format!("Failed to serialize docstore: {}", e)))?;
        write_atomic(&dir.join(DOCSTORE_FILE), &docstore_json)?;

        tracing::debug!(
            "Persisted artifact for owner '{}' ({} slots) to {}",
            owner_id,
            slots.len(),
            dir.display()
        );
        Ok(())
    }

    /// Load an owner's artifact.
    ///
    /// A missing or empty directory is `Ok(None)`. Anything else that
    /// cannot be read is an error.
    pub fn load(&self, owner_id: &str) -> AppResult<Option<IndexArtifact>> {
        let dir = self.owner_dir(owner_id);
        if !dir_has_entries(&dir) {
            return Ok(None);
        }

        let index_bytes = fs::read(dir.join(INDEX_FILE)).map_err(|e| {
            AppError::Persist(format!("Failed to read {}: {}", INDEX_FILE, e))
        })?;
        let docstore_bytes = fs::read(dir.join(DOCSTORE_FILE)).map_err(|e| {
            AppError::Persist(format!("Failed to read {}: {}", DOCSTORE_FILE, e))
        })?;

        let file: DocstoreFile = serde_json::from_slice(&docstore_bytes)
            .map_err(|e| AppError::Persist(format!("Corrupt {}: {}", DOCSTORE_FILE, e)))?;

        if file.format_version != FORMAT_VERSION {
            return Err(AppError::Persist(format!(
                "Unsupported docstore format version {}",
                file.format_version
            )));
        }
        if file.index_kind != FlatIndex::KIND {
            return Err(AppError::Persist(format!(
                "Unknown index kind '{}'",
                file.index_kind
            )));
        }

        let index = FlatIndex::from_bytes(&index_bytes)?;
        let total = index.len();

        let mut slots = file.slots;
        if slots.len() > total {
            tracing::warn!(
                "Slot map for owner '{}' has {} entries for {} vectors, dropping the excess",
                owner_id,
                slots.len(),
                total
            );
            slots.truncate(total);
        } else if slots.len() < total {
            tracing::warn!(
                "Slot map for owner '{}' covers {} of {} vectors; unmapped slots resolve by position",
                owner_id,
                slots.len(),
                total
            );
        }

        tracing::debug!(
            "Loaded artifact for owner '{}' ({} vectors) from {}",
            owner_id,
            total,
            dir.display()
        );

        Ok(Some(IndexArtifact::new(
            Box::new(index),
            slots,
            Docstore::from_documents(file.documents),
        )))
    }

    /// Delete an owner's directory. Missing is fine.
    pub fn remove(&self, owner_id: &str) -> AppResult<()> {
        let dir = self.owner_dir(owner_id);
        if !dir.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&dir).map_err(|e| {
            AppError::Persist(format!("Failed to remove {}: {}", dir.display(), e))
        })?;
        tracing::debug!("Removed artifact directory {}", dir.display());
        Ok(())
    }

    /// Owner ids with a non-empty directory under the root, sorted.
    pub fn persisted_owners(&self) -> Vec<String> {
        if !self.root.is_dir() {
            return Vec::new();
        }

        let mut owners: Vec<String> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter_map(|e| {
                let name = e.file_name().to_str()?;
                let owner = name.strip_prefix(&self.prefix)?;
                (!owner.is_empty() && dir_has_entries(e.path())).then(|| owner.to_string())
            })
            .collect();

        owners.sort();
        owners
    }
}

fn dir_has_entries(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> AppResult<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)
        .map_err(|e| AppError::Persist(format!("Failed to write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path).map_err(|e| {
        AppError::Persist(format!("Failed to move {} into place: {}", path.display(), e))
    })
}
