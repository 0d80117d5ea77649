//! # harbor-memory
//!
//! The tiered memory subsystem:
//!
//! - **Memory Store**: durable, owner-scoped CRUD for memory records and
//!   collections (SQLite, WAL).
//! - **Retention Manager**: batched pruning of task-tier records past the
//!   retention window, driven by a single pure policy function.
//! - **Retrieval Engine**: top-K queries combining HNSW vector similarity
//!   with recency ordering and a silent recency fallback when embeddings
//!   are unavailable.

pub mod index;
pub mod retention;
pub mod retrieval;
pub mod store;

pub use retention::{should_prune, RetentionConfig, RetentionManager, RetentionReport};
pub use retrieval::{backfill_embeddings, QueryOrder, RetrievalConfig, RetrievalEngine};
pub use store::MemoryStore;
