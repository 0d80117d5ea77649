use thiserror::Error;

/// Unified error type for the Harbor core.
#[derive(Error, Debug)]
pub enum HarborError {
    // ── Caller errors ──────────────────────────────────────────
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("access denied for owner {owner_id}")]
    AccessDenied { owner_id: String },

    #[error("not found: {0}")]
    NotFound(String),

    // ── Degraded / transient states ────────────────────────────
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    // ── Turn-level failures ────────────────────────────────────
    #[error("generation unavailable after {attempts} attempts: {reason}")]
    GenerationUnavailable { attempts: u32, reason: String },

    #[error("a turn is already in progress for owner {owner_id}")]
    TurnInProgress { owner_id: String },

    #[error("deadline exceeded after {0}ms")]
    DeadlineExceeded(u64),

    // ── Infrastructure wrappers ────────────────────────────────
    #[error("store error: {0}")]
    Store(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl HarborError {
    /// Caller errors are surfaced immediately and never retried.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            HarborError::InvalidArgument(_)
                | HarborError::AccessDenied { .. }
                | HarborError::NotFound(_)
        )
    }

    /// Transient errors may be retried or absorbed as degraded context.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HarborError::EmbeddingUnavailable(_)
                | HarborError::StoreUnavailable(_)
                | HarborError::DeadlineExceeded(_)
                | HarborError::Provider(_)
                | HarborError::Store(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, HarborError>;
