//! Store registry: the process-wide `owner -> artifact` cache.
//!
//! Two kinds of locks live here. The handle map sits behind a plain
//! `RwLock` that is only ever held for a lookup or a swap. Long-running
//! work for an owner (loading, building, adding, deleting) runs under that
//! owner's async mutex, obtained through [`StoreRegistry::lock_owner`], so
//! unrelated owners never wait on each other.

use crate::artifact::IndexArtifact;
use crate::builder::IndexBuilder;
use crate::canonical::ChunkStore;
use crate::persist::ArtifactLayout;
use crate::types::{validate_owner_id, ChunkMetadata, StoreStats};
use ragstore_core::{AppError, AppResult};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::OwnedMutexGuard;
use tracing::{info, instrument, warn};

/// Number of documents included in [`StoreStats::sample`].
const STATS_SAMPLE_SIZE: usize = 3;

/// Where a handle returned by [`StoreRegistry::get_or_create`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreSource {
    Cached,
    Loaded,
    BuiltFromSeed,
    RebuiltFromCanonical,
}

/// Texts to build from when an owner has no artifact yet.
#[derive(Debug, Clone, Copy)]
pub struct Seed<'a> {
    pub texts: &'a [String],
    pub metadatas: &'a [ChunkMetadata],
}

/// Proof that the caller holds an owner's mutation lock.
pub struct OwnerGuard {
    owner_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl OwnerGuard {
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

pub struct StoreRegistry {
    layout: ArtifactLayout,
    builder: IndexBuilder,
    chunks: Arc<dyn ChunkStore>,
    handles: RwLock<HashMap<String, Arc<IndexArtifact>>>,
    owner_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl StoreRegistry {
    pub fn new(layout: ArtifactLayout, builder: IndexBuilder, chunks: Arc<dyn ChunkStore>) -> Self {
        Self {
            layout,
            builder,
            chunks,
            handles: RwLock::new(HashMap::new()),
            owner_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn builder(&self) -> &IndexBuilder {
        &self.builder
    }

    pub fn chunks(&self) -> &Arc<dyn ChunkStore> {
        &self.chunks
    }

    /// Cached handle, without any I/O.
    pub fn cached(&self, owner_id: &str) -> Option<Arc<IndexArtifact>> {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(owner_id)
            .cloned()
    }

    /// Owners currently cached, sorted. Says nothing about what is on disk.
    pub fn list_loaded_owners(&self) -> Vec<String> {
        let mut owners: Vec<String> = self
            .handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        owners.sort();
        owners
    }

    /// Wait for exclusive mutation rights on an owner.
    ///
    /// Lock entries nobody holds or waits on are dropped here, so the map
    /// only tracks owners with work in flight.
    pub async fn lock_owner(&self, owner_id: &str) -> OwnerGuard {
        let lock = {
            let mut locks = self
                .owner_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            // Clones only happen under this mutex, so a count of one is final
            locks.retain(|owner, lock| owner == owner_id || Arc::strong_count(lock) > 1);
            locks.entry(owner_id.to_string()).or_default().clone()
        };

        OwnerGuard {
            owner_id: owner_id.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Return a usable artifact for `owner_id`.
    ///
    /// Order: cache, persisted artifact, `seed`, canonical records. Fails
    /// with [`AppError::NoStoreForOwner`] when all of them are empty.
    pub async fn get_or_create(
        &self,
        owner_id: &str,
        seed: Option<Seed<'_>>,
    ) -> AppResult<(Arc<IndexArtifact>, StoreSource)> {
        validate_owner_id(owner_id)?;

        if let Some(handle) = self.cached(owner_id) {
            return Ok((handle, StoreSource::Cached));
        }

        let guard = self.lock_owner(owner_id).await;
        self.get_or_create_locked(&guard, seed).await
    }

    /// [`get_or_create`](Self::get_or_create) for a caller already holding
    /// the owner lock.
    #[instrument(skip(self, guard, seed), fields(owner = %guard.owner_id))]
    pub async fn get_or_create_locked(
        &self,
        guard: &OwnerGuard,
        seed: Option<Seed<'_>>,
    ) -> AppResult<(Arc<IndexArtifact>, StoreSource)> {
        let owner_id = guard.owner_id();

        // Another caller may have finished while we waited for the lock
        if let Some(handle) = self.cached(owner_id) {
            return Ok((handle, StoreSource::Cached));
        }

        match self.layout.load(owner_id) {
            Ok(Some(artifact)) => {
                let artifact = artifact.with_embedder(self.builder.embedder().clone());
                let handle = Arc::new(artifact);
                self.insert_handle(owner_id, handle.clone());
                info!("Loaded persisted artifact for owner '{}'", owner_id);
                return Ok((handle, StoreSource::Loaded));
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    "Ignoring unreadable artifact for owner '{}', rebuilding: {}",
                    owner_id, e
                );
            }
        }

        if let Some(seed) = seed.filter(|s| !s.texts.is_empty()) {
            let artifact = self
                .builder
                .build_from_texts(seed.texts, seed.metadatas)
                .await?;
            let (handle, _) = self.publish(guard, artifact);
            info!(
                "Built artifact for owner '{}' from {} seed texts",
                owner_id,
                seed.texts.len()
            );
            return Ok((handle, StoreSource::BuiltFromSeed));
        }

        let records = self.chunks.find_by_owner(owner_id)?;
        if records.is_empty() {
            return Err(AppError::NoStoreForOwner {
                owner_id: owner_id.to_string(),
            });
        }

        let artifact = self.builder.build_from_records(&records).await?;
        let (handle, _) = self.publish(guard, artifact);
        info!(
            "Rebuilt artifact for owner '{}' from {} canonical records",
            owner_id,
            records.len()
        );
        Ok((handle, StoreSource::RebuiltFromCanonical))
    }

    /// Persist a finished artifact and swap it into the cache.
    ///
    /// A persist failure is logged and the artifact is still served from
    /// memory; the returned flag says whether it reached disk.
    pub fn publish(&self, guard: &OwnerGuard, artifact: IndexArtifact) -> (Arc<IndexArtifact>, bool) {
        let owner_id = guard.owner_id();

        let persisted = match self.layout.save(owner_id, &artifact) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Serving in-memory artifact for owner '{}', persist failed: {}",
                    owner_id, e
                );
                false
            }
        };

        let handle = Arc::new(artifact);
        self.insert_handle(owner_id, handle.clone());
        (handle, persisted)
    }

    /// Drop an owner's cache entry. Returns whether one existed.
    pub fn evict(&self, guard: &OwnerGuard) -> bool {
        let removed = self
            .handles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(guard.owner_id())
            .is_some();
        if removed {
            info!("Evicted owner '{}' from the registry", guard.owner_id());
        }
        removed
    }

    fn insert_handle(&self, owner_id: &str, handle: Arc<IndexArtifact>) {
        self.handles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(owner_id.to_string(), handle);
    }

    /// Load every persisted owner into the cache. Owners that fail to load
    /// are logged and skipped. Returns the owners loaded by this call.
    pub async fn load_all(&self) -> Vec<String> {
        let mut loaded = Vec::new();

        for owner_id in self.layout.persisted_owners() {
            if validate_owner_id(&owner_id).is_err() {
                warn!("Skipping artifact directory with invalid owner id {:?}", owner_id);
                continue;
            }

            let _guard = self.lock_owner(&owner_id).await;
            if self.cached(&owner_id).is_some() {
                continue;
            }

            match self.layout.load(&owner_id) {
                Ok(Some(artifact)) => {
                    let artifact = artifact.with_embedder(self.builder.embedder().clone());
                    self.insert_handle(&owner_id, Arc::new(artifact));
                    loaded.push(owner_id);
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to load artifact for owner '{}': {}", owner_id, e),
            }
        }

        info!("Loaded {} persisted owner artifacts", loaded.len());

        match self.chunks.list_owners() {
            Ok(owners) => {
                let unindexed: Vec<&str> = owners
                    .iter()
                    .map(String::as_str)
                    .filter(|owner| self.cached(owner).is_none())
                    .collect();
                if !unindexed.is_empty() {
                    info!(
                        "{} owners have records but no loaded index; they rebuild on first use: {:?}",
                        unindexed.len(),
                        unindexed
                    );
                }
            }
            Err(e) => warn!("Could not list canonical owners: {}", e),
        }

        loaded
    }

    /// Diagnostic snapshot. Never loads or builds.
    pub fn stats(&self, owner_id: &str) -> AppResult<StoreStats> {
        validate_owner_id(owner_id)?;

        let cached = self.cached(owner_id);
        Ok(StoreStats {
            owner_id: owner_id.to_string(),
            is_loaded: cached.is_some(),
            on_disk_exists: self.layout.exists(owner_id),
            vector_count: cached.as_ref().and_then(|a| a.vector_count()),
            docstore_count: cached.as_ref().map(|a| a.docstore().len()),
            sample: cached
                .as_ref()
                .map(|a| a.sample(STATS_SAMPLE_SIZE))
                .unwrap_or_default(),
        })
    }
}
