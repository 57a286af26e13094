//! Search engine: ranked matches for an owner's query.
//!
//! The primary path is the artifact's own scored search, which resolves
//! every slot strictly. If it is unavailable or fails, the fallback path
//! embeds the query itself, scans the raw index, and resolves slots
//! leniently so one bad slot never sinks the whole query.

use crate::artifact::IndexArtifact;
use crate::registry::{StoreRegistry, StoreSource};
use crate::types::{SearchHit, SearchOutcome, SearchPath, SlotResolution};
use ragstore_core::{AppError, AppResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// One step of a traced search.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum TraceStep {
    /// How the artifact was obtained and what it holds
    Artifact {
        source: StoreSource,
        vector_count: Option<usize>,
        slot_map_len: usize,
        docstore_len: usize,
    },
    NoData,
    PrimaryUnavailable,
    PrimaryFailed { error: String },
    Primary { hits: usize },
    QueryEmbedded { dimensions: usize },
    /// Raw neighbors including "no match" sentinels
    RawNeighbors { neighbors: Vec<TracedNeighbor> },
    SlotResolved { slot: usize, resolution: SlotResolution },
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TracedNeighbor {
    pub slot: i64,
    pub distance: f32,
}

/// Debug record of a whole search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchTrace {
    pub owner_id: String,
    pub query: String,
    pub top_k: usize,
    pub steps: Vec<TraceStep>,
    pub outcome: SearchOutcome,
}

pub struct SearchEngine {
    registry: Arc<StoreRegistry>,
}

impl SearchEngine {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self { registry }
    }

    /// Up to `top_k` matches for `query`, closest first.
    ///
    /// An owner without any data gives [`SearchOutcome::NoData`].
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn search(&self, owner_id: &str, query: &str, top_k: usize) -> AppResult<SearchOutcome> {
        let mut steps = Vec::new();
        self.run(owner_id, query, top_k, &mut steps).await
    }

    /// Same as [`search`](Self::search) but records every step.
    pub async fn explain(&self, owner_id: &str, query: &str, top_k: usize) -> AppResult<SearchTrace> {
        let mut steps = Vec::new();
        let outcome = self.run(owner_id, query, top_k, &mut steps).await?;
        Ok(SearchTrace {
            owner_id: owner_id.to_string(),
            query: query.to_string(),
            top_k,
            steps,
            outcome,
        })
    }

    async fn run(
        &self,
        owner_id: &str,
        query: &str,
        top_k: usize,
        steps: &mut Vec<TraceStep>,
    ) -> AppResult<SearchOutcome> {
        if top_k == 0 {
            return Err(AppError::InvalidInput("top_k must be at least 1".to_string()));
        }

        let (artifact, source) = match self.registry.get_or_create(owner_id, None).await {
            Ok(found) => found,
            Err(AppError::NoStoreForOwner { .. }) => {
                debug!("No data for owner '{}'", owner_id);
                steps.push(TraceStep::NoData);
                return Ok(SearchOutcome::NoData);
            }
            Err(e) => return Err(e),
        };

        steps.push(TraceStep::Artifact {
            source,
            vector_count: artifact.vector_count(),
            slot_map_len: artifact.slots().len(),
            docstore_len: artifact.docstore().len(),
        });

        if artifact.is_empty() {
            steps.push(TraceStep::NoData);
            return Ok(SearchOutcome::NoData);
        }

        if artifact.supports_scored_search() {
            match artifact.similarity_search_with_score(query, top_k).await {
                Ok(results) => {
                    steps.push(TraceStep::Primary {
                        hits: results.len(),
                    });
                    let hits = results
                        .into_iter()
                        .map(|(document, score)| SearchHit {
                            document,
                            score,
                            resolution: SlotResolution::Mapped,
                        })
                        .collect();
                    return Ok(SearchOutcome::Matches {
                        hits,
                        path: SearchPath::Primary,
                        degraded: false,
                    });
                }
                Err(e) => {
                    warn!(
                        "Primary search failed for owner '{}', using fallback: {}",
                        owner_id, e
                    );
                    steps.push(TraceStep::PrimaryFailed {
                        error: e.to_string(),
                    });
                }
            }
        } else {
            steps.push(TraceStep::PrimaryUnavailable);
        }

        self.fallback(owner_id, &artifact, query, top_k, steps).await
    }

    async fn fallback(
        &self,
        owner_id: &str,
        artifact: &IndexArtifact,
        query: &str,
        top_k: usize,
        steps: &mut Vec<TraceStep>,
    ) -> AppResult<SearchOutcome> {
        let query_vector = self.registry.builder().embedder().embed(query).await?;
        steps.push(TraceStep::QueryEmbedded {
            dimensions: query_vector.len(),
        });

        let neighbors = artifact.raw_search(&query_vector, top_k)?;
        steps.push(TraceStep::RawNeighbors {
            neighbors: neighbors
                .iter()
                .map(|n| TracedNeighbor {
                    slot: n.slot,
                    distance: n.distance,
                })
                .collect(),
        });

        let mut hits = Vec::with_capacity(neighbors.len());
        let mut degraded = false;

        for neighbor in neighbors {
            if neighbor.is_none() || neighbor.slot < 0 {
                continue;
            }

            let slot = neighbor.slot as usize;
            let (document, resolution) = artifact.resolve_slot(slot);
            steps.push(TraceStep::SlotResolved { slot, resolution });

            if resolution != SlotResolution::Mapped {
                degraded = true;
                warn!(
                    "Search degraded for owner '{}': slot {} resolved as {:?}",
                    owner_id, slot, resolution
                );
            }

            hits.push(SearchHit {
                document,
                score: neighbor.distance,
                resolution,
            });
        }

        Ok(SearchOutcome::Matches {
            hits,
            path: SearchPath::Fallback,
            degraded,
        })
    }
}
