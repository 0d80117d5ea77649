use std::sync::Arc;
use tracing::{debug, warn};

use harbor_core::{MemoryRecord, Tier};
use harbor_memory::{MemoryStore, QueryOrder, RetrievalEngine};

use crate::signals::GoalRelevancePredicate;

/// Personal-tier slots in a bundle.
pub const PERSONAL_TOP_K: usize = 5;
/// Project-tier slots in a bundle (only when goal-relevant).
pub const PROJECT_TOP_K: usize = 3;
/// Task-tier slots in a bundle.
pub const TASK_TOP_K: usize = 3;
/// Hard ceiling on bundle size. Unbounded context degrades generation
/// quality and cost, so this is an invariant, not a tunable.
pub const MAX_BUNDLE_RECORDS: usize = PERSONAL_TOP_K + PROJECT_TOP_K + TASK_TOP_K;

/// Upper bound on the stressor scan. Stressors ride alongside the bundle
/// for policy evaluation and do not count against the record cap.
const STRESSOR_SCAN_LIMIT: usize = 16;

/// The bounded set of memories handed to generation for one turn,
/// grouped by tier, plus the flags that explain how it was built.
#[derive(Debug, Clone, Default)]
pub struct ContextBundle {
    pub personal: Vec<MemoryRecord>,
    pub project: Vec<MemoryRecord>,
    pub task: Vec<MemoryRecord>,
    /// Personal-tier records flagged as stressors, surfaced separately so
    /// the policy engine can reason about volume. Drawn from the whole
    /// tier, not limited to the ranked personal slots.
    pub stressors: Vec<MemoryRecord>,
    pub project_queried: bool,
    pub project_reason: Option<String>,
}

impl ContextBundle {
    pub fn len(&self) -> usize {
        self.personal.len() + self.project.len() + self.task.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All bundled records in tier order: personal, project, task.
    pub fn records(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.personal
            .iter()
            .chain(self.project.iter())
            .chain(self.task.iter())
    }
}

/// Decides which tier queries to issue for a message and assembles the
/// bundle. Sub-query failures degrade that tier to empty rather than
/// failing the turn — partial memory beats no response.
pub struct ContextComposer {
    retrieval: Arc<RetrievalEngine>,
    store: Arc<MemoryStore>,
    relevance: Arc<dyn GoalRelevancePredicate>,
}

impl ContextComposer {
    pub fn new(
        retrieval: Arc<RetrievalEngine>,
        store: Arc<MemoryStore>,
        relevance: Arc<dyn GoalRelevancePredicate>,
    ) -> Self {
        Self {
            retrieval,
            store,
            relevance,
        }
    }

    pub async fn compose(&self, owner_id: &str, message: &str) -> ContextBundle {
        let mut bundle = ContextBundle::default();

        // Personal tier: always, relevance-ordered against the message.
        bundle.personal = self
            .tier_query(
                owner_id,
                Tier::Personal,
                Some(message),
                PERSONAL_TOP_K,
                QueryOrder::Relevance,
            )
            .await;

        // Project tier: only when the message looks goal-relevant.
        if let Some(reason) = self.relevance.goal_relevance(message) {
            debug!(owner_id, reason, "project tier queried");
            bundle.project = self
                .tier_query(
                    owner_id,
                    Tier::Project,
                    Some(message),
                    PROJECT_TOP_K,
                    QueryOrder::Relevance,
                )
                .await;
            bundle.project_queried = true;
            bundle.project_reason = Some(reason);
        }

        // Task tier: always, most recent first, for short-term continuity.
        bundle.task = self
            .tier_query(owner_id, Tier::Task, None, TASK_TOP_K, QueryOrder::Recency)
            .await;

        // Stressors are scanned across the whole personal tier, not just
        // the ranked slots above, so their count reflects the owner's
        // actual load rather than the bundle sample.
        bundle.stressors = match self.store.list_stressors(owner_id, STRESSOR_SCAN_LIMIT) {
            Ok(records) => records,
            Err(e) => {
                warn!(owner_id, error = %e, "stressor scan failed, continuing without");
                Vec::new()
            }
        };

        debug_assert!(bundle.len() <= MAX_BUNDLE_RECORDS);

        // Every record that made it into the bundle counts as read.
        let ids: Vec<_> = bundle.records().map(|r| r.id).collect();
        if let Err(e) = self.store.touch(owner_id, &ids) {
            warn!(owner_id, error = %e, "failed to touch bundled records");
        }

        bundle
    }

    /// One tier query, degraded to empty on failure.
    async fn tier_query(
        &self,
        owner_id: &str,
        tier: Tier,
        text: Option<&str>,
        limit: usize,
        order: QueryOrder,
    ) -> Vec<MemoryRecord> {
        match self.retrieval.query(owner_id, tier, text, limit, order).await {
            Ok(records) => records,
            Err(e) => {
                warn!(owner_id, %tier, error = %e, "tier query failed, degrading to empty");
                Vec::new()
            }
        }
    }
}
