//! Vector index abstraction.
//!
//! The index manager does not care which nearest-neighbor algorithm sits
//! underneath an artifact. It cares about what the index can do, which is
//! declared up front through [`IndexCapabilities`] instead of being probed
//! at call time.

use ragstore_core::{AppError, AppResult};

/// Slot value reported for "no neighbor" when fewer than `k` vectors exist.
pub const NO_MATCH: i64 = -1;

const FLAT_MAGIC: &[u8; 4] = b"RSFI";
const FLAT_VERSION: u32 = 1;
const FLAT_HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// One raw nearest-neighbor result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub distance: f32,
    pub slot: i64,
}

impl Neighbor {
    /// Padding entry for neighbor positions with no match.
    pub const NONE: Neighbor = Neighbor {
        distance: f32::MAX,
        slot: NO_MATCH,
    };

    pub fn is_none(&self) -> bool {
        self.slot == NO_MATCH
    }
}

/// What an index implementation supports besides searching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCapabilities {
    /// Append many vectors in one call without rebuilding
    pub batch_append: bool,
    /// Insert a single vector at a time
    pub single_insert: bool,
    /// `ntotal()` returns an exact count
    pub reports_count: bool,
}

/// Trait for nearest-neighbor index backends.
pub trait VectorIndex: Send + Sync + std::fmt::Debug {
    /// Stable identifier written into persisted artifacts.
    fn kind(&self) -> &'static str;

    fn dimensions(&self) -> usize;

    fn capabilities(&self) -> IndexCapabilities;

    /// Number of stored vectors, when the index can tell.
    fn ntotal(&self) -> Option<usize>;

    /// Append vectors; their slots follow the existing ones in order.
    fn append_batch(&mut self, _vectors: &[Vec<f32>]) -> AppResult<()> {
        Err(AppError::Other(format!(
            "{} index does not support batch append",
            self.kind()
        )))
    }

    /// Insert one vector and return its slot.
    fn insert(&mut self, _vector: &[f32]) -> AppResult<usize> {
        Err(AppError::Other(format!(
            "{} index does not support single inserts",
            self.kind()
        )))
    }

    /// Return exactly `k` neighbors ordered closest first, padded with
    /// [`Neighbor::NONE`] when fewer vectors exist.
    fn search(&self, query: &[f32], k: usize) -> AppResult<Vec<Neighbor>>;

    /// Serialize the index for persistence.
    fn to_bytes(&self) -> AppResult<Vec<u8>>;

    fn clone_box(&self) -> Box<dyn VectorIndex>;
}

impl Clone for Box<dyn VectorIndex> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Exact squared-L2 index over a contiguous buffer.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub const KIND: &'static str = "flat-l2";

    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            data: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        if self.dimensions == 0 {
            0
        } else {
            self.data.len() / self.dimensions
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn check_dimensions(&self, vector: &[f32]) -> AppResult<()> {
        if vector.len() != self.dimensions {
            return Err(AppError::InvalidInput(format!(
                "Vector dimension mismatch: expected {}, got {}",
                self.dimensions,
                vector.len()
            )));
        }
        Ok(())
    }

    /// Deserialize an index written by [`VectorIndex::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        if bytes.len() < FLAT_HEADER_LEN || &bytes[0..4] != FLAT_MAGIC {
            return Err(AppError::Persist("Not a flat index file".to_string()));
        }

        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FLAT_VERSION {
            return Err(AppError::Persist(format!(
                "Unsupported flat index version {}",
                version
            )));
        }

        let dimensions = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&bytes[12..20]);
        let count = u64::from_le_bytes(count_bytes);

        // Header fields are untrusted until they agree with the payload
        let expected = usize::try_from(count)
            .ok()
            .and_then(|count| count.checked_mul(dimensions))
            .ok_or_else(|| {
                AppError::Persist(format!(
                    "Flat index header is corrupt: {} vectors of {} dimensions",
                    count, dimensions
                ))
            })?;

        let data = bytes_to_vector(&bytes[FLAT_HEADER_LEN..])?;
        if data.len() != expected {
            return Err(AppError::Persist(format!(
                "Flat index payload holds {} floats, header promises {} x {}",
                data.len(),
                count,
                dimensions
            )));
        }

        Ok(Self { dimensions, data })
    }
}

impl VectorIndex for FlatIndex {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn capabilities(&self) -> IndexCapabilities {
        IndexCapabilities {
            batch_append: true,
            single_insert: true,
            reports_count: true,
        }
    }

    fn ntotal(&self) -> Option<usize> {
        Some(self.len())
    }

    fn append_batch(&mut self, vectors: &[Vec<f32>]) -> AppResult<()> {
        // Validate everything first so a bad vector leaves the index untouched
        for vector in vectors {
            self.check_dimensions(vector)?;
        }
        self.data.reserve(vectors.len() * self.dimensions);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    fn insert(&mut self, vector: &[f32]) -> AppResult<usize> {
        self.check_dimensions(vector)?;
        let slot = self.len();
        self.data.extend_from_slice(vector);
        Ok(slot)
    }

    fn search(&self, query: &[f32], k: usize) -> AppResult<Vec<Neighbor>> {
        self.check_dimensions(query)?;

        let mut scored: Vec<Neighbor> = if self.dimensions == 0 {
            Vec::new()
        } else {
            self.data
                .chunks_exact(self.dimensions)
                .enumerate()
                .map(|(slot, vector)| Neighbor {
                    distance: squared_l2(query, vector),
                    slot: slot as i64,
                })
                .collect()
        };

        // Stable sort: equal distances keep slot order
        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored.resize(k, Neighbor::NONE);

        Ok(scored)
    }

    fn to_bytes(&self) -> AppResult<Vec<u8>> {
        let dimensions = u32::try_from(self.dimensions)
            .map_err(|_| AppError::Persist("Index dimension too large".to_string()))?;

        let mut bytes = Vec::with_capacity(FLAT_HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(FLAT_MAGIC);
        bytes.extend_from_slice(&FLAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&dimensions.to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&vector_to_bytes(&self.data));
        Ok(bytes)
    }

    fn clone_box(&self) -> Box<dyn VectorIndex> {
        Box::new(self.clone())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Convert floats to little-endian bytes.
fn vector_to_bytes(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for &value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert little-endian bytes back to floats.
fn bytes_to_vector(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Persist("Invalid vector bytes length".to_string()));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
