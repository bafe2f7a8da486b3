//! Pipeline wiring.
//!
//! [`Pipeline::from_config`] builds the whole stack from one
//! [`SwitchboardConfig`]: pooled SQLite with migrations applied, the cache
//! store, the TTS provider behind the factory, the singleflight invoker,
//! the escalation controller, and the assembler. The call layer then
//! drives [`Pipeline::handle_utterance`] per caller turn and listens on
//! the returned transfer-signal receiver.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use switchboard_cache::{CacheStore, EvictionPolicy, EvictionSettings};
use switchboard_db::{create_pool, repo, run_migrations, DbPool, MigrationError, PoolError};
use switchboard_synth::{create_provider, SynthError, TtsFallbackInvoker};
use switchboard_types::{AudioStream, CallId, Classification};

use crate::assembler::{AssemblerSettings, ResponseAssembler};
use crate::classifier::{create_classifier, Classifier};
use crate::config::SwitchboardConfig;
use crate::error::AssembleError;
use crate::escalation::{EscalationSettings, FallbackEscalationController, TransferSignal};

/// Errors raised while constructing the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The connection pool could not be created.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A pooled connection could not be obtained.
    #[error("connection error: {0}")]
    Connection(#[from] r2d2::Error),

    /// Schema migrations failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// The configured TTS provider or classifier is invalid.
    #[error(transparent)]
    Provider(#[from] SynthError),

    /// The configured classifier is invalid.
    #[error(transparent)]
    Classifier(#[from] AssembleError),
}

/// The assembled synthesis pipeline, one per process.
pub struct Pipeline {
    pool: DbPool,
    store: CacheStore,
    assembler: ResponseAssembler,
    classifier: Arc<dyn Classifier>,
    escalation: Arc<FallbackEscalationController>,
    eviction: EvictionPolicy,
    latency_budget: Duration,
}

impl Pipeline {
    /// Builds every component from configuration and applies migrations.
    ///
    /// Returns the pipeline plus the receiver the call layer listens on
    /// for transfer signals.
    ///
    /// # Errors
    ///
    /// Fails if the database cannot be opened or migrated, or if the
    /// configured provider or classifier identifier is unknown.
    pub fn from_config(
        config: &SwitchboardConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransferSignal>), PipelineError> {
        let pool = create_pool(&config.db_path, config.database.to_pool_settings())?;
        {
            let conn = pool.get()?;
            let applied = run_migrations(&conn)?;
            if !applied.is_empty() {
                tracing::info!(count = applied.len(), migrations = ?applied, "applied schema migrations");
            }
        }

        let store = CacheStore::new(pool.clone(), &config.audio_dir);
        let provider = create_provider(&config.provider.kind, config.provider.to_provider_config())?;
        tracing::info!(
            provider = provider.name(),
            classifier = %config.classifier,
            db_path = %config.db_path,
            "pipeline configured"
        );
        let invoker = Arc::new(TtsFallbackInvoker::new(store.clone(), provider));
        let classifier = create_classifier(&config.classifier, pool.clone())?;

        let (escalation, signals) = FallbackEscalationController::new(EscalationSettings {
            max_fallback_count: config.max_fallback_count,
            transfer_queue: config.transfer_queue.clone(),
            transfer_audio_key: config.transfer_audio_key.clone(),
        });
        let escalation = Arc::new(escalation);

        let assembler = ResponseAssembler::new(
            pool.clone(),
            store.clone(),
            invoker,
            escalation.clone(),
            AssemblerSettings {
                filler_segment_key: config.filler_segment_key.clone(),
                error_segment_key: config.error_segment_key.clone(),
                transfer_segment_key: config.transfer_audio_key.clone(),
                cache_ttl_seconds: config.cache.ttl_seconds,
                voice: config.provider.voice.clone(),
            },
        );

        let eviction = EvictionPolicy::new(
            store.clone(),
            EvictionSettings {
                high_water_bytes: config.cache.high_water_bytes,
                low_water_bytes: config.cache.low_water_bytes,
                sweep_interval: Duration::from_secs(config.cache.sweep_interval_secs),
            },
        );

        Ok((
            Self {
                pool,
                store,
                assembler,
                classifier,
                escalation,
                eviction,
                latency_budget: Duration::from_millis(config.latency_budget_ms),
            },
            signals,
        ))
    }

    /// Spawns the background eviction sweep on the current runtime.
    pub fn spawn_eviction(&self) -> tokio::task::JoinHandle<()> {
        self.eviction.clone().spawn()
    }

    /// Registers a new call session.
    pub fn start_call(&self, call_id: CallId) {
        self.escalation.start_call(call_id);
    }

    /// Drops a finished call's session state.
    pub fn end_call(&self, call_id: CallId) {
        self.escalation.end_call(call_id);
    }

    /// One caller turn: classify the utterance, then assemble the matched
    /// intent's response under the configured latency budget.
    ///
    /// Low-confidence and no-match turns count as fallbacks toward
    /// escalation and render the generic-error audio. Escalated calls skip
    /// classification entirely and render silence; the call layer already
    /// holds the transfer signal for them.
    pub async fn handle_utterance(
        &self,
        call_id: CallId,
        agent_id: &str,
        utterance: &str,
        bindings: &HashMap<String, String>,
        language: &str,
    ) -> AudioStream {
        if !self.escalation.classify_allowed(call_id) {
            tracing::debug!(call_id = %call_id, "call escalated, skipping classification");
            return AudioStream::default();
        }

        let classification = match self.classifier.classify(agent_id, utterance).await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(call_id = %call_id, agent_id, error = %err, "classification failed");
                None
            }
        };

        match self.accepted(agent_id, classification) {
            Some(intent_id) => {
                self.assembler
                    .assemble(
                        call_id,
                        agent_id,
                        &intent_id,
                        bindings,
                        language,
                        self.latency_budget,
                    )
                    .await
            }
            None => {
                let phase = self.escalation.record_failure(call_id);
                tracing::info!(
                    call_id = %call_id,
                    agent_id,
                    phase = phase.label(),
                    "no confident intent match"
                );
                self.assembler
                    .error_audio(language)
                    .unwrap_or_default()
            }
        }
    }

    /// Applies the matched intent's own confidence threshold.
    fn accepted(&self, agent_id: &str, classification: Option<Classification>) -> Option<String> {
        let classification = classification?;
        let conn = self.pool.get().ok()?;
        let intent = repo::get_intent(&conn, &classification.intent_id).ok()??;
        if intent.agent_id != agent_id || !intent.active {
            return None;
        }
        if classification.confidence < intent.confidence_threshold {
            tracing::debug!(
                intent_id = %intent.id,
                confidence = classification.confidence,
                threshold = intent.confidence_threshold,
                "classification below intent threshold"
            );
            return None;
        }
        Some(intent.id)
    }

    /// Direct assembly for a pre-classified intent, used when the call
    /// layer does its own intent selection.
    pub async fn assemble(
        &self,
        call_id: CallId,
        agent_id: &str,
        intent_id: &str,
        bindings: &HashMap<String, String>,
        language: &str,
    ) -> AudioStream {
        self.assembler
            .assemble(call_id, agent_id, intent_id, bindings, language, self.latency_budget)
            .await
    }

    /// The assembler, for callers that manage their own budgets.
    pub fn assembler(&self) -> &ResponseAssembler {
        &self.assembler
    }

    /// The escalation controller.
    pub fn escalation(&self) -> &Arc<FallbackEscalationController> {
        &self.escalation
    }

    /// The cache store shared across the pipeline.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}
