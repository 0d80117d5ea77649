use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use harbor_core::{HarborError, MemoryRecord, OwnerId, Result, Tier};
use harbor_llm::EmbeddingProvider;

use crate::index::VectorIndex;
use crate::store::MemoryStore;

/// Ordering of retrieval results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    /// Ascending cosine distance to the query text. Requires a text query.
    Relevance,
    /// `created_at` descending — the default for recent task context.
    Recency,
}

/// Tuning for the retrieval engine, taken from `[memory.index]` and the
/// embedding deadline.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub ef_construction: usize,
    pub ef_search: usize,
    pub embedding_deadline: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            ef_construction: 100,
            ef_search: 64,
            embedding_deadline: Duration::from_secs(10),
        }
    }
}

/// Answers "top-K memories relevant to this query" for a single tier.
///
/// Similarity ordering needs the embedding collaborator; when it is down
/// or no candidate carries an embedding, the query silently degrades to
/// recency ordering. Cross-tier fan-out belongs to the Context Composer.
pub struct RetrievalEngine {
    store: Arc<MemoryStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
    /// Built indexes keyed by (owner, tier), invalidated by store write
    /// versions.
    indexes: Mutex<HashMap<(OwnerId, Tier), Arc<VectorIndex>>>,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<MemoryStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
            indexes: Mutex::new(HashMap::new()),
        }
    }

    /// Top-`limit` records of one tier for one owner.
    ///
    /// With a text query, results come back ascending by cosine distance;
    /// records without an embedding are excluded from that ordering.
    /// Without a text query, `order` must be `Recency`.
    pub async fn query(
        &self,
        owner_id: &str,
        tier: Tier,
        text_query: Option<&str>,
        limit: usize,
        order: QueryOrder,
    ) -> Result<Vec<MemoryRecord>> {
        if limit == 0 {
            return Err(HarborError::InvalidArgument(
                "limit must be positive".into(),
            ));
        }

        match (text_query, order) {
            (Some(text), QueryOrder::Relevance) => {
                match self.similarity_query(owner_id, tier, text, limit).await {
                    Ok(Some(records)) => Ok(records),
                    // Degraded, not failed: no embeddings to search against,
                    // or the embedding service is down.
                    Ok(None) => self.store.list_recent(owner_id, tier, limit),
                    Err(e) => Err(e),
                }
            }
            (_, QueryOrder::Recency) => self.store.list_recent(owner_id, tier, limit),
            (None, QueryOrder::Relevance) => Err(HarborError::InvalidArgument(
                "relevance ordering requires a text query".into(),
            )),
        }
    }

    /// Similarity path. `Ok(None)` signals "fall back to recency".
    async fn similarity_query(
        &self,
        owner_id: &str,
        tier: Tier,
        text: &str,
        limit: usize,
    ) -> Result<Option<Vec<MemoryRecord>>> {
        let index = self.current_index(owner_id, tier)?;
        if index.is_empty() {
            debug!(owner_id, %tier, "no embedded candidates, using recency order");
            return Ok(None);
        }

        let query_embedding = match tokio::time::timeout(
            self.config.embedding_deadline,
            self.embedder.embed(&[text]),
        )
        .await
        {
            Ok(Ok(mut vectors)) if !vectors.is_empty() => vectors.remove(0),
            Ok(Ok(_)) | Ok(Err(_)) | Err(_) => {
                warn!(owner_id, %tier, "embedding unavailable, using recency order");
                return Ok(None);
            }
        };

        let neighbors = index.nearest(&query_embedding, limit);
        let mut records = Vec::with_capacity(neighbors.len());
        for (id, distance) in neighbors {
            match self.store.get(owner_id, id) {
                Ok(record) => {
                    debug!(%id, distance, "similarity hit");
                    records.push(record);
                }
                // A record deleted since the index was built; skip it.
                Err(HarborError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(Some(records))
    }

    /// The index for (owner, tier), rebuilt if the store has moved since
    /// it was last built.
    fn current_index(&self, owner_id: &str, tier: Tier) -> Result<Arc<VectorIndex>> {
        let version = self.store.tier_version(owner_id, tier);
        let key = (owner_id.to_string(), tier);

        if let Some(index) = self.indexes.lock().get(&key) {
            if index.built_version == version {
                return Ok(Arc::clone(index));
            }
        }

        let entries = self.store.load_embedded(owner_id, tier)?;
        debug!(owner_id, %tier, count = entries.len(), "rebuilding vector index");
        let index = Arc::new(VectorIndex::build(
            entries,
            self.config.ef_construction,
            self.config.ef_search,
            version,
        ));
        self.indexes.lock().insert(key, Arc::clone(&index));
        Ok(index)
    }
}

/// Repair records whose embedding generation was deferred at write time.
/// Processes at most `limit` records; returns how many were backfilled.
pub async fn backfill_embeddings(
    store: &MemoryStore,
    embedder: &dyn EmbeddingProvider,
    owner_id: &str,
    limit: usize,
) -> Result<usize> {
    let pending = store.list_missing_embeddings(owner_id, limit)?;
    if pending.is_empty() {
        return Ok(0);
    }

    let texts: Vec<&str> = pending.iter().map(|r| r.content.as_str()).collect();
    let embeddings = embedder.embed(&texts).await?;

    let mut updated = 0usize;
    for (record, embedding) in pending.iter().zip(embeddings.iter()) {
        store.set_embedding(owner_id, record.id, embedding)?;
        updated += 1;
    }
    debug!(owner_id, updated, "backfilled embeddings");
    Ok(updated)
}
