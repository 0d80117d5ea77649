use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::types::{CollectionId, MemoryId, OwnerId};

/// Reserved attribute keys the core reads when evaluating policy.
/// All other keys are producer-defined and treated as opaque.
pub mod attrs {
    /// Boolean — marks a memory as an active stressor for its owner.
    pub const STRESSOR: &str = "stressor";
    /// String — emotion tag attached by the producer.
    pub const EMOTION: &str = "emotion";
    /// String — free-form category label.
    pub const CATEGORY: &str = "category";
    /// String — goal/mission this memory is linked to.
    pub const GOAL_ID: &str = "goal_id";
    /// String — conversation/session this memory was written by.
    pub const CONVERSATION_ID: &str = "conversation_id";
}

/// Retention class of a memory record. Fixed at creation, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Identity, preferences, long-term facts. Never pruned by age.
    Personal,
    /// Goal and mission context. Retained until explicitly deleted.
    Project,
    /// Per-turn conversational residue. Pruned after the retention window.
    Task,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Personal => "personal",
            Tier::Project => "project",
            Tier::Task => "task",
        }
    }

    pub const ALL: [Tier; 3] = [Tier::Personal, Tier::Project, Tier::Task];
}

impl FromStr for Tier {
    type Err = crate::HarborError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "personal" => Ok(Tier::Personal),
            "project" => Ok(Tier::Project),
            "task" => Ok(Tier::Task),
            other => Err(crate::HarborError::InvalidArgument(format!(
                "unknown tier: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single memory the agent holds about an owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: MemoryId,
    /// Every query and mutation is scoped by this owner.
    pub owner_id: OwnerId,
    pub tier: Tier,
    /// Canonical human-readable content.
    pub content: String,
    /// Embedding vector. Absent is a valid transient state — backfilled
    /// once embedding generation succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Open key/value metadata (stressor flag, emotion tag, goal link, ...).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    /// Updated whenever this record lands in a composed context bundle.
    pub last_accessed_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Create a record with empty attributes and no embedding. Timestamps
    /// are assigned by the store at insert time.
    pub fn new(owner_id: impl Into<OwnerId>, tier: Tier, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4(),
            owner_id: owner_id.into(),
            tier,
            content: content.into(),
            embedding: None,
            attributes: serde_json::Map::new(),
            created_at: now,
            last_accessed_at: now,
        }
    }

    /// Builder-style attribute attachment.
    pub fn with_attr(mut self, key: &str, value: serde_json::Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Whether this record carries the reserved stressor flag.
    pub fn is_stressor(&self) -> bool {
        self.attributes
            .get(attrs::STRESSOR)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// The reserved emotion tag, if present.
    pub fn emotion(&self) -> Option<&str> {
        self.attributes.get(attrs::EMOTION).and_then(|v| v.as_str())
    }
}

/// An organizational label over memories. Has no effect on retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCollection {
    pub id: CollectionId,
    pub owner_id: OwnerId,
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl MemoryCollection {
    pub fn new(
        owner_id: impl Into<OwnerId>,
        category: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            owner_id: owner_id.into(),
            category: category.into(),
            name: name.into(),
            description: None,
        }
    }
}
