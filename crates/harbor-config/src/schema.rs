use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration — maps to `harbor.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarborConfig {
    pub memory: MemoryConfig,
    pub policy: PolicyConfig,
    pub pipeline: PipelineConfig,
    pub services: ServicesConfig,
    pub logging: LoggingConfig,
}

// ── Memory store & retention ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Path to the SQLite database. None = `~/.harbor/memory.db`.
    pub db_path: Option<PathBuf>,
    /// Task-tier records older than this are eligible for pruning.
    pub retention_max_age_days: i64,
    /// How often the retention pass runs.
    pub retention_interval_secs: u64,
    /// Records deleted per transaction during a retention pass.
    pub retention_batch_size: usize,
    pub index: IndexConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            retention_max_age_days: 30,
            retention_interval_secs: 86_400,
            retention_batch_size: 500,
            index: IndexConfig::default(),
        }
    }
}

/// HNSW accuracy/speed knobs. Larger values are slower and more accurate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Candidate-list breadth during index construction.
    pub ef_construction: usize,
    /// Candidate-list breadth during search.
    pub ef_search: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            ef_construction: 100,
            ef_search: 64,
        }
    }
}

// ── Policy engine ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Circuit breaker arms when the stressor count exceeds this.
    pub stressor_threshold: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            stressor_threshold: 5,
        }
    }
}

// ── Conversation pipeline ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum generation attempts per turn (including the first).
    pub generation_attempts: u32,
    /// Base backoff between generation retries, doubled per attempt.
    pub retry_backoff_ms: u64,
    /// Deadline for a single generation call.
    pub generation_deadline_secs: u64,
    /// Deadline for a single embedding call.
    pub embedding_deadline_secs: u64,
    /// When true, a second same-owner turn queues behind the first.
    /// When false it is rejected with `TurnInProgress`.
    pub queue_turns: bool,
    /// Background retry attempts for a failed memory write.
    pub store_retry_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            generation_attempts: 3,
            retry_backoff_ms: 500,
            generation_deadline_secs: 60,
            embedding_deadline_secs: 10,
            queue_turns: false,
            store_retry_attempts: 3,
        }
    }
}

// ── External services ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// API key for the OpenAI-compatible generation/embedding endpoints.
    pub api_key: Option<String>,
    /// Base URL override (e.g. a proxy or local server).
    pub base_url: Option<String>,
    pub generation_model: Option<String>,
    pub embedding_model: Option<String>,
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Tracing filter directive, e.g. "info" or "harbor_memory=debug".
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl HarborConfig {
    /// Validate the config. Returns warnings for odd-but-workable values,
    /// errors for values the system cannot run with.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if self.memory.retention_max_age_days <= 0 {
            return Err(format!(
                "memory.retention_max_age_days must be positive, got {}",
                self.memory.retention_max_age_days
            ));
        }
        if self.memory.retention_batch_size == 0 {
            return Err("memory.retention_batch_size must be at least 1".into());
        }
        if self.memory.index.ef_search == 0 || self.memory.index.ef_construction == 0 {
            return Err("memory.index breadth parameters must be at least 1".into());
        }
        if self.pipeline.generation_attempts == 0 {
            return Err("pipeline.generation_attempts must be at least 1".into());
        }

        if self.memory.retention_interval_secs < 60 {
            warnings.push(format!(
                "memory.retention_interval_secs = {} is under a minute; retention will run very often",
                self.memory.retention_interval_secs
            ));
        }
        if self.policy.stressor_threshold == 0 {
            warnings.push(
                "policy.stressor_threshold = 0 means any stressor can arm the circuit breaker"
                    .into(),
            );
        }

        Ok(warnings)
    }

    /// Resolved database path.
    pub fn db_path(&self) -> PathBuf {
        self.memory.db_path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".harbor")
                .join("memory.db")
        })
    }
}
