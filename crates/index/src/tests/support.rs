//! Test doubles and fixtures shared by the scenario tests.

use crate::artifact::IndexArtifact;
use crate::canonical::{ChunkStore, SqliteChunkStore};
use crate::embeddings::providers::mock::MockProvider;
use crate::embeddings::EmbeddingProvider;
use crate::persist::ArtifactLayout;
use crate::types::{ChunkMetadata, ChunkRecord, Document};
use crate::vector_index::{FlatIndex, IndexCapabilities, Neighbor, VectorIndex};
use crate::IndexManager;
use ragstore_core::{AppError, AppResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const DIMENSIONS: usize = 64;

/// Mock provider that counts batch calls and can be told to fail.
#[derive(Debug)]
pub struct CountingProvider {
    inner: MockProvider,
    batches: AtomicUsize,
    failing: AtomicBool,
    delay: Duration,
}

impl CountingProvider {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: MockProvider::new("trigram-v1", DIMENSIONS),
            batches: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            delay,
        }
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for CountingProvider {
    fn provider_name(&self) -> &str {
        "counting"
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Embedding("provider unreachable".to_string()));
        }
        self.inner.embed_batch(texts).await
    }
}

/// SQLite chunk store whose reads can be switched off.
pub struct FlakyChunkStore {
    inner: SqliteChunkStore,
    reads_fail: AtomicBool,
}

impl FlakyChunkStore {
    pub fn open(temp: &TempDir) -> Self {
        Self {
            inner: SqliteChunkStore::open(&temp.path().join("chunks.sqlite")).unwrap(),
            reads_fail: AtomicBool::new(false),
        }
    }

    pub fn set_reads_fail(&self, fail: bool) {
        self.reads_fail.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> AppResult<()> {
        if self.reads_fail.load(Ordering::SeqCst) {
            return Err(AppError::ChunkStore("database is locked".to_string()));
        }
        Ok(())
    }
}

impl ChunkStore for FlakyChunkStore {
    fn insert_many(&self, records: &[ChunkRecord]) -> AppResult<usize> {
        self.inner.insert_many(records)
    }

    fn find_by_owner(&self, owner_id: &str) -> AppResult<Vec<ChunkRecord>> {
        self.check_read()?;
        self.inner.find_by_owner(owner_id)
    }

    fn find_by_file(&self, owner_id: &str, file_id: &str) -> AppResult<Vec<ChunkRecord>> {
        self.inner.find_by_file(owner_id, file_id)
    }

    fn count_by_owner(&self, owner_id: &str) -> AppResult<usize> {
        self.inner.count_by_owner(owner_id)
    }

    fn delete_by_file(&self, owner_id: &str, file_id: &str) -> AppResult<usize> {
        self.inner.delete_by_file(owner_id, file_id)
    }

    fn list_owners(&self) -> AppResult<Vec<String>> {
        self.inner.list_owners()
    }
}

/// Flat index that pretends to lack some capabilities.
#[derive(Debug, Clone)]
pub struct RestrictedIndex {
    inner: FlatIndex,
    capabilities: IndexCapabilities,
}

impl RestrictedIndex {
    pub fn new(inner: FlatIndex, capabilities: IndexCapabilities) -> Self {
        Self {
            inner,
            capabilities,
        }
    }
}

impl VectorIndex for RestrictedIndex {
    fn kind(&self) -> &'static str {
        FlatIndex::KIND
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn capabilities(&self) -> IndexCapabilities {
        self.capabilities
    }

    fn ntotal(&self) -> Option<usize> {
        if self.capabilities.reports_count {
            self.inner.ntotal()
        } else {
            None
        }
    }

    fn append_batch(&mut self, vectors: &[Vec<f32>]) -> AppResult<()> {
        if !self.capabilities.batch_append {
            return Err(AppError::Other("batch append disabled".to_string()));
        }
        self.inner.append_batch(vectors)
    }

    fn insert(&mut self, vector: &[f32]) -> AppResult<usize> {
        if !self.capabilities.single_insert {
            return Err(AppError::Other("single insert disabled".to_string()));
        }
        self.inner.insert(vector)
    }

    fn search(&self, query: &[f32], k: usize) -> AppResult<Vec<Neighbor>> {
        self.inner.search(query, k)
    }

    fn to_bytes(&self) -> AppResult<Vec<u8>> {
        self.inner.to_bytes()
    }

    fn clone_box(&self) -> Box<dyn VectorIndex> {
        Box::new(self.clone())
    }
}

pub fn capabilities(batch_append: bool, single_insert: bool, reports_count: bool) -> IndexCapabilities {
    IndexCapabilities {
        batch_append,
        single_insert,
        reports_count,
    }
}

/// Temp directory, doubles, and a manager wired to them.
pub struct Harness {
    pub temp: TempDir,
    pub provider: Arc<CountingProvider>,
    pub chunks: Arc<FlakyChunkStore>,
    pub manager: IndexManager,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_provider(CountingProvider::new())
    }

    pub fn with_provider(provider: CountingProvider) -> Self {
        let temp = TempDir::new().unwrap();
        let provider = Arc::new(provider);
        let chunks = Arc::new(FlakyChunkStore::open(&temp));
        let manager = Self::manager_for(&temp, provider.clone(), chunks.clone());
        Self {
            temp,
            provider,
            chunks,
            manager,
        }
    }

    /// A second manager over the same directory and stores, with an empty
    /// cache, as after a process restart.
    pub fn restart(&self) -> IndexManager {
        Self::manager_for(&self.temp, self.provider.clone(), self.chunks.clone())
    }

    fn manager_for(
        temp: &TempDir,
        provider: Arc<CountingProvider>,
        chunks: Arc<FlakyChunkStore>,
    ) -> IndexManager {
        IndexManager::with_parts(
            ArtifactLayout::new(temp.path().join("vectors"), "owner_"),
            provider,
            chunks,
        )
    }

    pub fn layout(&self) -> &ArtifactLayout {
        self.manager.registry().layout()
    }

    /// Canonical records for `file_id`, inserted without touching any index.
    pub fn seed_records(&self, owner_id: &str, file_id: &str, texts: &[&str]) {
        let records: Vec<ChunkRecord> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| ChunkRecord::new(&ChunkMetadata::new(owner_id, file_id, i as u32), *text))
            .collect();
        self.chunks.insert_many(&records).unwrap();
    }

    /// What the ingestion path does: index under the record ids first, then
    /// record canonically.
    pub async fn ingest(&self, owner_id: &str, file_id: &str, texts: &[&str]) -> crate::AddOutcome {
        let records: Vec<ChunkRecord> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| ChunkRecord::new(&ChunkMetadata::new(owner_id, file_id, i as u32), *text))
            .collect();

        let outcome = self
            .manager
            .add_documents(owner_id, records.iter().map(Document::from).collect())
            .await
            .unwrap();
        self.chunks.insert_many(&records).unwrap();

        outcome
    }

    /// Replace the owner's cached artifact with a copy on `capabilities`.
    pub async fn restrict(&self, owner_id: &str, capabilities: IndexCapabilities) {
        let registry = self.manager.registry();
        let guard = registry.lock_owner(owner_id).await;
        let (current, _) = registry.get_or_create_locked(&guard, None).await.unwrap();

        let flat = FlatIndex::from_bytes(&current.index().to_bytes().unwrap()).unwrap();
        let artifact = IndexArtifact::new(
            Box::new(RestrictedIndex::new(flat, capabilities)),
            current.slots().clone(),
            current.docstore().clone(),
        )
        .with_embedder(self.provider.clone());

        registry.publish(&guard, artifact);
    }

    /// Replace the owner's cached artifact with one whose slot map only
    /// covers the first `mapped` slots.
    pub async fn break_mapping(&self, owner_id: &str, mapped: usize) {
        let registry = self.manager.registry();
        let guard = registry.lock_owner(owner_id).await;
        let (current, _) = registry.get_or_create_locked(&guard, None).await.unwrap();

        let mut slots = current.slots().clone();
        slots.truncate(mapped);
        let artifact = IndexArtifact::new(
            current.index().clone_box(),
            slots,
            current.docstore().clone(),
        )
        .with_embedder(self.provider.clone());

        registry.publish(&guard, artifact);
    }
}

pub fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn metadatas(owner_id: &str, file_id: &str, n: usize) -> Vec<ChunkMetadata> {
    (0..n)
        .map(|i| ChunkMetadata::new(owner_id, file_id, i as u32))
        .collect()
}
