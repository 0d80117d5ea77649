use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as TokioMutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use harbor_config::PipelineConfig;
use harbor_core::{attrs, Clock, HarborError, MemoryRecord, OwnerId, Result, Tier, TurnId};
use harbor_llm::{EmbeddingProvider, GenerationProvider, GenerationRequest};
use harbor_memory::MemoryStore;

use crate::composer::{ContextBundle, ContextComposer};
use crate::policy::{Directive, PolicyEngine, ResponseMode};
use crate::signals::EmotionalState;

/// Snapshot produced by `receive_input`.
#[derive(Debug, Clone)]
struct TurnRequest {
    turn_id: TurnId,
    owner_id: OwnerId,
    message: String,
    received_at: DateTime<Utc>,
}

/// Snapshot produced by `recall_context`.
#[derive(Debug, Clone)]
struct RecalledTurn {
    request: TurnRequest,
    bundle: ContextBundle,
}

/// Snapshot produced by `reason` (and passed through `respond`).
#[derive(Debug, Clone)]
struct ReasonedTurn {
    request: TurnRequest,
    bundle: ContextBundle,
    directive: Directive,
    response: String,
}

/// What one completed turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn_id: TurnId,
    pub owner_id: OwnerId,
    pub response: String,
    pub directive: Directive,
    pub bundle_size: usize,
    pub project_queried: bool,
    /// False when the task-memory write failed and was handed to the
    /// background retry; the response is valid either way.
    pub memory_persisted: bool,
}

/// The five-stage conversation pipeline:
/// receive → recall → reason → respond → persist.
///
/// Stages for one turn run strictly sequentially, each consuming the
/// previous stage's snapshot. At most one turn per owner is in flight at
/// a time; turns for different owners are fully independent.
pub struct ConversationPipeline {
    composer: ContextComposer,
    policy: PolicyEngine,
    generation: Arc<dyn GenerationProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<MemoryStore>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
    /// Per-owner turn locks. They guard logical conversation state, not
    /// storage, which stays shared.
    turn_locks: RwLock<HashMap<OwnerId, Arc<TokioMutex<()>>>>,
}

impl ConversationPipeline {
    pub fn new(
        composer: ContextComposer,
        policy: PolicyEngine,
        generation: Arc<dyn GenerationProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<MemoryStore>,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            composer,
            policy,
            generation,
            embedder,
            store,
            clock,
            config,
            turn_locks: RwLock::new(HashMap::new()),
        }
    }

    /// Run one complete turn for an owner.
    ///
    /// A second call for the same owner while a turn is in flight either
    /// queues behind it (`queue_turns = true`) or fails with
    /// `TurnInProgress`.
    pub async fn process_turn(
        &self,
        owner_id: &str,
        message: &str,
        emotional_signal: Option<EmotionalState>,
    ) -> Result<TurnOutcome> {
        let lock = self.turn_lock(owner_id).await;
        let _guard = if self.config.queue_turns {
            lock.lock_owned().await
        } else {
            lock.try_lock_owned()
                .map_err(|_| HarborError::TurnInProgress {
                    owner_id: owner_id.to_string(),
                })?
        };

        let request = self.receive_input(owner_id, message)?;
        debug!(turn_id = %request.turn_id, owner_id, "turn started");

        let recalled = self.recall_context(request).await;
        let reasoned = self.reason(recalled, emotional_signal).await?;
        let reasoned = self.respond(reasoned);
        let outcome = self.store_memory(reasoned).await;

        info!(
            turn_id = %outcome.turn_id,
            owner_id,
            bundle = outcome.bundle_size,
            persisted = outcome.memory_persisted,
            "turn complete"
        );
        Ok(outcome)
    }

    /// Stage 1: validate the message and stamp it with identity and time.
    fn receive_input(&self, owner_id: &str, message: &str) -> Result<TurnRequest> {
        let message = message.trim();
        if message.is_empty() {
            return Err(HarborError::InvalidArgument("message is empty".into()));
        }
        if owner_id.is_empty() {
            return Err(HarborError::InvalidArgument("owner_id is empty".into()));
        }
        Ok(TurnRequest {
            turn_id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            message: message.to_string(),
            received_at: self.clock.now(),
        })
    }

    /// Stage 2: assemble the context bundle. Never fails; a failed tier
    /// degrades to empty inside the composer.
    async fn recall_context(&self, request: TurnRequest) -> RecalledTurn {
        let bundle = self
            .composer
            .compose(&request.owner_id, &request.message)
            .await;
        RecalledTurn { request, bundle }
    }

    /// Stage 3: derive the directive and call generation with bounded
    /// retry. Exhausting retries fails the turn rather than fabricating
    /// a response.
    async fn reason(
        &self,
        state: RecalledTurn,
        emotional_signal: Option<EmotionalState>,
    ) -> Result<ReasonedTurn> {
        let directive = self.policy.evaluate(
            &state.request.message,
            &state.bundle,
            emotional_signal,
            self.clock.local_hour(),
        );
        if directive.circuit_breaker_triggered {
            info!(owner_id = %state.request.owner_id, "circuit breaker triggered");
        }

        let request = GenerationRequest::new(state.request.message.clone())
            .with_system(build_system(&state.bundle, &directive));

        let response = self.generate_with_retry(&request).await?;
        Ok(ReasonedTurn {
            request: state.request,
            bundle: state.bundle,
            directive,
            response: response.text,
        })
    }

    /// Stage 4: reserved extension point for response post-processing
    /// (filtering, redaction). Currently a pass-through.
    fn respond(&self, state: ReasonedTurn) -> ReasonedTurn {
        state
    }

    /// Stage 5: persist the exchange as a task-tier record. Best-effort
    /// relative to the response: a failed write is logged and retried in
    /// the background, never surfaced to the user.
    async fn store_memory(&self, state: ReasonedTurn) -> TurnOutcome {
        let summary = format!(
            "User: {}\nAssistant: {}",
            state.request.message, state.response
        );

        let mut record = MemoryRecord::new(&state.request.owner_id, Tier::Task, summary)
            .with_attr(
                attrs::CONVERSATION_ID,
                serde_json::json!(state.request.turn_id.to_string()),
            )
            .with_attr(
                "received_at",
                serde_json::json!(state.request.received_at.to_rfc3339()),
            );

        // Embedding is nice-to-have at write time; a missing one is
        // repaired later by the backfill pass.
        match tokio::time::timeout(
            Duration::from_secs(self.config.embedding_deadline_secs),
            self.embedder.embed(&[&record.content]),
        )
        .await
        {
            Ok(Ok(mut vectors)) if !vectors.is_empty() => {
                record.embedding = Some(vectors.remove(0));
            }
            Ok(Ok(_)) | Ok(Err(_)) | Err(_) => {
                debug!(owner_id = %state.request.owner_id, "storing memory without embedding");
            }
        }

        let memory_persisted = match self.store.create(record.clone()) {
            Ok(_) => true,
            Err(e) if e.is_transient() => {
                warn!(owner_id = %state.request.owner_id, error = %e, "memory write failed, scheduling retry");
                self.retry_store_in_background(record);
                false
            }
            Err(e) => {
                // A rejected record will not get better with retries.
                error!(owner_id = %state.request.owner_id, error = %e, "memory write rejected");
                false
            }
        };

        TurnOutcome {
            turn_id: state.request.turn_id,
            owner_id: state.request.owner_id,
            response: state.response,
            directive: state.directive,
            bundle_size: state.bundle.len(),
            project_queried: state.bundle.project_queried,
            memory_persisted,
        }
    }

    /// Bounded exponential backoff around the generation call. Every
    /// attempt carries a deadline; a timed-out attempt counts as failed.
    async fn generate_with_retry(
        &self,
        request: &GenerationRequest,
    ) -> Result<harbor_llm::GenerationResponse> {
        let attempts = self.config.generation_attempts.max(1);
        let deadline = Duration::from_secs(self.config.generation_deadline_secs);
        let mut backoff = Duration::from_millis(self.config.retry_backoff_ms);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match tokio::time::timeout(deadline, self.generation.generate(request)).await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) if e.is_caller_error() => return Err(e),
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "generation attempt failed");
                    last_error = e.to_string();
                }
                Err(_) => {
                    let timeout = HarborError::DeadlineExceeded(deadline.as_millis() as u64);
                    warn!(attempt, "generation attempt timed out");
                    last_error = timeout.to_string();
                }
            }
            if attempt < attempts {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        Err(HarborError::GenerationUnavailable {
            attempts,
            reason: last_error,
        })
    }

    /// Retry a failed memory write off the turn's critical path.
    fn retry_store_in_background(&self, record: MemoryRecord) {
        let store = Arc::clone(&self.store);
        let attempts = self.config.store_retry_attempts.max(1);
        tokio::spawn(async move {
            let mut backoff = Duration::from_millis(250);
            for attempt in 1..=attempts {
                tokio::time::sleep(backoff).await;
                match store.create(record.clone()) {
                    Ok(_) => {
                        debug!(attempt, "background memory write succeeded");
                        return;
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "background memory write failed");
                        backoff *= 2;
                    }
                }
            }
            error!(owner_id = %record.owner_id, "memory write abandoned after retries");
        });
    }

    async fn turn_lock(&self, owner_id: &str) -> Arc<TokioMutex<()>> {
        // Fast path: lock already exists
        {
            let locks = self.turn_locks.read().await;
            if let Some(lock) = locks.get(owner_id) {
                return Arc::clone(lock);
            }
        }
        // Slow path: create a new lock
        let mut locks = self.turn_locks.write().await;
        Arc::clone(
            locks
                .entry(owner_id.to_string())
                .or_insert_with(|| Arc::new(TokioMutex::new(()))),
        )
    }
}

/// Fold the bundle and directive into system guidance for generation.
fn build_system(bundle: &ContextBundle, directive: &Directive) -> String {
    let mut system = String::from("You are a supportive companion agent.\n");

    if !bundle.personal.is_empty() {
        system.push_str("\nWhat you know about the user:\n");
        for record in &bundle.personal {
            system.push_str(&format!("- {}\n", record.content));
        }
    }
    if !bundle.project.is_empty() {
        system.push_str("\nActive goals and projects:\n");
        for record in &bundle.project {
            system.push_str(&format!("- {}\n", record.content));
        }
    }
    if !bundle.task.is_empty() {
        system.push_str("\nRecent conversation context:\n");
        for record in &bundle.task {
            system.push_str(&format!("- {}\n", record.content));
        }
    }

    let tone = match directive.response_mode {
        ResponseMode::ValidateAndOfferBreak => {
            "The user is overwhelmed. Validate their feelings, do not push productivity, and gently offer a break."
        }
        ResponseMode::MomentumPush => {
            "The user has energy and momentum. Encourage concrete next steps."
        }
        ResponseMode::Standard => "Respond in a warm, grounded tone.",
    };
    system.push('\n');
    system.push_str(tone);
    system
}
