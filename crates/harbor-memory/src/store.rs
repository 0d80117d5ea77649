use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use harbor_core::{
    Clock, CollectionId, HarborError, MemoryCollection, MemoryId, MemoryRecord, OwnerId, Result,
    Tier,
};

/// Durable, owner-scoped storage for memory records and collections.
///
/// Every operation takes the calling owner's identity and refuses — with
/// `AccessDenied` — any operation whose target record belongs to someone
/// else. No network calls originate here.
pub struct MemoryStore {
    db: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
    /// Write-version counters per (owner, tier), bumped on any mutation
    /// that can change retrieval results. The retrieval engine uses these
    /// to know when a cached vector index is stale.
    versions: Mutex<HashMap<(OwnerId, Tier), u64>>,
}

impl MemoryStore {
    /// Open or create the memory database at the given path.
    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        info!(?path, "opening memory store");

        let conn = Connection::open(path).map_err(store_err)?;

        // WAL for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(store_err)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                tier TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB,
                attributes TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                last_accessed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_memories_owner_tier_created
                ON memories(owner_id, tier, created_at);

            CREATE TABLE IF NOT EXISTS collections (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                category TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_collections_owner ON collections(owner_id);
            ",
        )
        .map_err(store_err)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            clock,
            versions: Mutex::new(HashMap::new()),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        Self::open(Path::new(":memory:"), clock)
    }

    /// Current write version for an (owner, tier) pair. Starts at 0.
    pub fn tier_version(&self, owner_id: &str, tier: Tier) -> u64 {
        self.versions
            .lock()
            .get(&(owner_id.to_string(), tier))
            .copied()
            .unwrap_or(0)
    }

    fn bump_version(&self, owner_id: &str, tier: Tier) {
        *self
            .versions
            .lock()
            .entry((owner_id.to_string(), tier))
            .or_insert(0) += 1;
    }

    // ── Record CRUD ────────────────────────────────────────────

    /// Insert a new record. `created_at`/`last_accessed_at` are assigned
    /// here from the injected clock; whatever the caller put in those
    /// fields is ignored.
    pub fn create(&self, record: MemoryRecord) -> Result<MemoryId> {
        if record.owner_id.is_empty() {
            return Err(HarborError::InvalidArgument("owner_id is empty".into()));
        }
        if record.content.is_empty() {
            return Err(HarborError::InvalidArgument("content is empty".into()));
        }

        let now = self.clock.now().to_rfc3339();
        let attributes = serde_json::to_string(&record.attributes)?;
        let embedding_blob = record.embedding.as_deref().map(encode_embedding);

        let db = self.db.lock();
        db.execute(
            "INSERT INTO memories (id, owner_id, tier, content, embedding, attributes, created_at, last_accessed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            rusqlite::params![
                record.id.to_string(),
                record.owner_id,
                record.tier.as_str(),
                record.content,
                embedding_blob,
                attributes,
                now,
            ],
        )
        .map_err(store_err)?;
        drop(db);

        self.bump_version(&record.owner_id, record.tier);
        Ok(record.id)
    }

    /// Fetch a record. `NotFound` if absent, `AccessDenied` if it exists
    /// but belongs to another owner.
    pub fn get(&self, owner_id: &str, id: MemoryId) -> Result<MemoryRecord> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT id, owner_id, tier, content, embedding, attributes, created_at, last_accessed_at
                 FROM memories WHERE id = ?1",
            )
            .map_err(store_err)?;

        let record = stmt
            .query_row(rusqlite::params![id.to_string()], row_to_record)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    HarborError::NotFound(format!("memory {id}"))
                }
                other => store_err(other),
            })??;

        if record.owner_id != owner_id {
            return Err(HarborError::AccessDenied {
                owner_id: owner_id.to_string(),
            });
        }
        Ok(record)
    }

    /// Delete a record. Idempotent: deleting an already-absent record
    /// succeeds silently. Deleting another owner's record is refused.
    pub fn delete(&self, owner_id: &str, id: MemoryId) -> Result<()> {
        let db = self.db.lock();
        let existing: Option<(String, String)> = db
            .query_row(
                "SELECT owner_id, tier FROM memories WHERE id = ?1",
                rusqlite::params![id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();

        let Some((record_owner, tier_str)) = existing else {
            return Ok(());
        };
        if record_owner != owner_id {
            return Err(HarborError::AccessDenied {
                owner_id: owner_id.to_string(),
            });
        }

        db.execute(
            "DELETE FROM memories WHERE id = ?1",
            rusqlite::params![id.to_string()],
        )
        .map_err(store_err)?;
        drop(db);

        if let Ok(tier) = tier_str.parse::<Tier>() {
            self.bump_version(owner_id, tier);
        }
        Ok(())
    }

    /// Delete several records of one owner in a single transaction.
    pub fn delete_many(&self, owner_id: &str, ids: &[MemoryId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut db = self.db.lock();
        let tx = db.transaction().map_err(store_err)?;
        let mut deleted = 0usize;
        for id in ids {
            deleted += tx
                .execute(
                    "DELETE FROM memories WHERE id = ?1 AND owner_id = ?2",
                    rusqlite::params![id.to_string(), owner_id],
                )
                .map_err(store_err)?;
        }
        tx.commit().map_err(store_err)?;
        drop(db);

        for tier in Tier::ALL {
            self.bump_version(owner_id, tier);
        }
        Ok(deleted)
    }

    /// Cascade delete: removes all records and collections of an owner in
    /// one transaction. Readers observe either the full pre-delete set or
    /// nothing, never a partial view.
    pub fn delete_all_for_owner(&self, owner_id: &str) -> Result<usize> {
        let mut db = self.db.lock();
        let tx = db.transaction().map_err(store_err)?;
        let records = tx
            .execute(
                "DELETE FROM memories WHERE owner_id = ?1",
                rusqlite::params![owner_id],
            )
            .map_err(store_err)?;
        tx.execute(
            "DELETE FROM collections WHERE owner_id = ?1",
            rusqlite::params![owner_id],
        )
        .map_err(store_err)?;
        tx.commit().map_err(store_err)?;
        drop(db);

        info!(owner_id, records, "cascade-deleted owner memory space");
        for tier in Tier::ALL {
            self.bump_version(owner_id, tier);
        }
        Ok(records)
    }

    // ── Queries ────────────────────────────────────────────────

    /// Records of one tier older than a cutoff, oldest first. Used by the
    /// Retention Manager; backed by the (owner, tier, created_at) index.
    pub fn list_by_tier_and_age(
        &self,
        owner_id: &str,
        tier: Tier,
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT id, owner_id, tier, content, embedding, attributes, created_at, last_accessed_at
                 FROM memories
                 WHERE owner_id = ?1 AND tier = ?2 AND created_at < ?3
                 ORDER BY created_at ASC
                 LIMIT ?4",
            )
            .map_err(store_err)?;
        collect_records(&mut stmt, rusqlite::params![
            owner_id,
            tier.as_str(),
            older_than.to_rfc3339(),
            limit as i64,
        ])
    }

    /// Most recent records of one tier, newest first.
    pub fn list_recent(&self, owner_id: &str, tier: Tier, limit: usize) -> Result<Vec<MemoryRecord>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT id, owner_id, tier, content, embedding, attributes, created_at, last_accessed_at
                 FROM memories
                 WHERE owner_id = ?1 AND tier = ?2
                 ORDER BY created_at DESC
                 LIMIT ?3",
            )
            .map_err(store_err)?;
        collect_records(
            &mut stmt,
            rusqlite::params![owner_id, tier.as_str(), limit as i64],
        )
    }

    /// Personal-tier records carrying the stressor flag, newest first.
    /// Scans the whole tier, not just what retrieval would rank highest,
    /// so policy sees the owner's full stressor load.
    pub fn list_stressors(&self, owner_id: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT id, owner_id, tier, content, embedding, attributes, created_at, last_accessed_at
                 FROM memories
                 WHERE owner_id = ?1 AND tier = 'personal'
                   AND json_extract(attributes, '$.stressor') = 1
                 ORDER BY created_at DESC
                 LIMIT ?2",
            )
            .map_err(store_err)?;
        collect_records(&mut stmt, rusqlite::params![owner_id, limit as i64])
    }

    /// All (id, embedding) pairs of one tier that have an embedding.
    /// Feeds vector-index construction.
    pub fn load_embedded(&self, owner_id: &str, tier: Tier) -> Result<Vec<(MemoryId, Vec<f32>)>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT id, embedding FROM memories
                 WHERE owner_id = ?1 AND tier = ?2 AND embedding IS NOT NULL",
            )
            .map_err(store_err)?;

        let rows = stmt
            .query_map(rusqlite::params![owner_id, tier.as_str()], |row| {
                let id_str: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((id_str, blob))
            })
            .map_err(store_err)?
            .filter_map(|r| r.ok())
            .filter_map(|(id_str, blob)| {
                let id = id_str.parse::<MemoryId>().ok()?;
                let embedding = decode_embedding(&blob)?;
                Some((id, embedding))
            })
            .collect();
        Ok(rows)
    }

    /// Records of an owner still waiting for an embedding, oldest first.
    pub fn list_missing_embeddings(&self, owner_id: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT id, owner_id, tier, content, embedding, attributes, created_at, last_accessed_at
                 FROM memories
                 WHERE owner_id = ?1 AND embedding IS NULL
                 ORDER BY created_at ASC
                 LIMIT ?2",
            )
            .map_err(store_err)?;
        collect_records(&mut stmt, rusqlite::params![owner_id, limit as i64])
    }

    /// Owners that have task-tier records older than the cutoff.
    pub fn owners_with_expired_tasks(&self, older_than: DateTime<Utc>) -> Result<Vec<OwnerId>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT DISTINCT owner_id FROM memories
                 WHERE tier = 'task' AND created_at < ?1",
            )
            .map_err(store_err)?;
        let owners = stmt
            .query_map(rusqlite::params![older_than.to_rfc3339()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(store_err)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(owners)
    }

    /// Per-tier record counts for one owner.
    pub fn count_by_tier(&self, owner_id: &str) -> Result<HashMap<Tier, usize>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare("SELECT tier, COUNT(*) FROM memories WHERE owner_id = ?1 GROUP BY tier")
            .map_err(store_err)?;
        let mut counts = HashMap::new();
        let rows = stmt
            .query_map(rusqlite::params![owner_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(store_err)?;
        for row in rows.filter_map(|r| r.ok()) {
            if let Ok(tier) = row.0.parse::<Tier>() {
                counts.insert(tier, row.1 as usize);
            }
        }
        Ok(counts)
    }

    // ── Mutations ──────────────────────────────────────────────

    /// Mark records as read: bumps `last_accessed_at` to now. Called for
    /// every record that lands in a composed context bundle.
    pub fn touch(&self, owner_id: &str, ids: &[MemoryId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let now = self.clock.now().to_rfc3339();
        let mut db = self.db.lock();
        let tx = db.transaction().map_err(store_err)?;
        for id in ids {
            tx.execute(
                "UPDATE memories SET last_accessed_at = ?1 WHERE id = ?2 AND owner_id = ?3",
                rusqlite::params![now, id.to_string(), owner_id],
            )
            .map_err(store_err)?;
        }
        tx.commit().map_err(store_err)
    }

    /// Backfill an embedding that was deferred at creation time.
    pub fn set_embedding(&self, owner_id: &str, id: MemoryId, embedding: &[f32]) -> Result<()> {
        let record = self.get(owner_id, id)?;
        let blob = encode_embedding(embedding);
        let db = self.db.lock();
        db.execute(
            "UPDATE memories SET embedding = ?1 WHERE id = ?2",
            rusqlite::params![blob, id.to_string()],
        )
        .map_err(store_err)?;
        drop(db);
        self.bump_version(owner_id, record.tier);
        Ok(())
    }

    // ── Collections ────────────────────────────────────────────

    pub fn create_collection(&self, collection: MemoryCollection) -> Result<CollectionId> {
        if collection.owner_id.is_empty() {
            return Err(HarborError::InvalidArgument("owner_id is empty".into()));
        }
        let db = self.db.lock();
        db.execute(
            "INSERT INTO collections (id, owner_id, category, name, description)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                collection.id.to_string(),
                collection.owner_id,
                collection.category,
                collection.name,
                collection.description,
            ],
        )
        .map_err(store_err)?;
        Ok(collection.id)
    }

    pub fn get_collection(&self, owner_id: &str, id: CollectionId) -> Result<MemoryCollection> {
        let db = self.db.lock();
        let collection = db
            .query_row(
                "SELECT id, owner_id, category, name, description FROM collections WHERE id = ?1",
                rusqlite::params![id.to_string()],
                row_to_collection,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    HarborError::NotFound(format!("collection {id}"))
                }
                other => store_err(other),
            })??;

        if collection.owner_id != owner_id {
            return Err(HarborError::AccessDenied {
                owner_id: owner_id.to_string(),
            });
        }
        Ok(collection)
    }

    pub fn list_collections(&self, owner_id: &str) -> Result<Vec<MemoryCollection>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT id, owner_id, category, name, description FROM collections
                 WHERE owner_id = ?1 ORDER BY name",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(rusqlite::params![owner_id], row_to_collection)
            .map_err(store_err)?
            .filter_map(|r| r.ok())
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Idempotent, owner-scoped collection delete.
    pub fn delete_collection(&self, owner_id: &str, id: CollectionId) -> Result<()> {
        let db = self.db.lock();
        let existing: Option<String> = db
            .query_row(
                "SELECT owner_id FROM collections WHERE id = ?1",
                rusqlite::params![id.to_string()],
                |row| row.get(0),
            )
            .ok();
        match existing {
            None => Ok(()),
            Some(record_owner) if record_owner != owner_id => Err(HarborError::AccessDenied {
                owner_id: owner_id.to_string(),
            }),
            Some(_) => {
                db.execute(
                    "DELETE FROM collections WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                )
                .map_err(store_err)?;
                Ok(())
            }
        }
    }
}

// ── Row and blob codecs ────────────────────────────────────────

fn store_err(e: rusqlite::Error) -> HarborError {
    HarborError::Store(e.to_string())
}

/// Embeddings are stored as little-endian f32 bytes.
fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

type RowResult = std::result::Result<Result<MemoryRecord>, rusqlite::Error>;

fn row_to_record(row: &rusqlite::Row<'_>) -> RowResult {
    let id_str: String = row.get(0)?;
    let owner_id: String = row.get(1)?;
    let tier_str: String = row.get(2)?;
    let content: String = row.get(3)?;
    let embedding_blob: Option<Vec<u8>> = row.get(4)?;
    let attributes_str: String = row.get(5)?;
    let created_str: String = row.get(6)?;
    let accessed_str: String = row.get(7)?;

    Ok((|| {
        let id = id_str
            .parse::<MemoryId>()
            .map_err(|e| HarborError::Store(format!("bad memory id: {e}")))?;
        let tier = tier_str.parse::<Tier>()?;
        let attributes = serde_json::from_str(&attributes_str)?;
        let embedding = embedding_blob.as_deref().and_then(decode_embedding);
        let created_at = parse_timestamp(&created_str)?;
        let last_accessed_at = parse_timestamp(&accessed_str)?;
        Ok(MemoryRecord {
            id,
            owner_id,
            tier,
            content,
            embedding,
            attributes,
            created_at,
            last_accessed_at,
        })
    })())
}

fn row_to_collection(
    row: &rusqlite::Row<'_>,
) -> std::result::Result<Result<MemoryCollection>, rusqlite::Error> {
    let id_str: String = row.get(0)?;
    let owner_id: String = row.get(1)?;
    let category: String = row.get(2)?;
    let name: String = row.get(3)?;
    let description: Option<String> = row.get(4)?;

    Ok((|| {
        let id = id_str
            .parse::<CollectionId>()
            .map_err(|e| HarborError::Store(format!("bad collection id: {e}")))?;
        Ok(MemoryCollection {
            id,
            owner_id,
            category,
            name,
            description,
        })
    })())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| HarborError::Store(format!("bad timestamp {s}: {e}")))
}

fn collect_records(
    stmt: &mut rusqlite::Statement<'_>,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<MemoryRecord>> {
    let rows = stmt
        .query_map(params, row_to_record)
        .map_err(store_err)?
        .filter_map(|r| r.ok())
        .collect::<Vec<_>>();
    rows.into_iter().collect()
}
