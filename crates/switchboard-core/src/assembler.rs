//! Response assembly.
//!
//! One `assemble()` call turns an intent plus variable bindings into a
//! playable audio stream. Cache hits are free; unresolved elements are
//! synthesized synchronously under the remaining latency budget, and a
//! budget overrun substitutes the configured please-wait filler instead
//! of stalling the call. Every per-render error is caught at the
//! [`ResponseAssembler::assemble`] boundary and converted into the
//! generic-error audio.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use switchboard_cache::{key, CacheStore};
use switchboard_db::{repo, DbPool};
use switchboard_synth::{SynthError, SynthesisRequest, TtsFallbackInvoker};
use switchboard_types::{AudioStream, CallId, CacheNamespace, Intent, IntentAction};

use crate::error::{AssembleError, ConfigurationError};
use crate::escalation::FallbackEscalationController;
use crate::template::{ResolvedElement, TemplateEngine};

/// Assembly tunables.
#[derive(Debug, Clone)]
pub struct AssemblerSettings {
    /// Segment key of the please-wait filler substituted on budget
    /// exhaustion.
    pub filler_segment_key: String,
    /// Segment key of the generic-error audio played when a render fails.
    pub error_segment_key: String,
    /// Segment key of the announcement played before a human transfer.
    pub transfer_segment_key: String,
    /// TTL for unpinned entries created by fallback synthesis, in seconds.
    pub cache_ttl_seconds: i64,
    /// Voice passed to the provider.
    pub voice: String,
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self {
            filler_segment_key: "please_wait".to_string(),
            error_segment_key: "generic_error".to_string(),
            transfer_segment_key: "transfer_to_agent".to_string(),
            cache_ttl_seconds: 30 * 24 * 3600,
            voice: "en".to_string(),
        }
    }
}

/// Orchestrates cache lookups, template rendering, and fallback synthesis
/// into one response per call turn.
pub struct ResponseAssembler {
    pool: DbPool,
    store: CacheStore,
    invoker: Arc<TtsFallbackInvoker>,
    engine: TemplateEngine,
    escalation: Arc<FallbackEscalationController>,
    settings: AssemblerSettings,
}

impl ResponseAssembler {
    /// Creates an assembler over the shared pipeline state.
    pub fn new(
        pool: DbPool,
        store: CacheStore,
        invoker: Arc<TtsFallbackInvoker>,
        escalation: Arc<FallbackEscalationController>,
        settings: AssemblerSettings,
    ) -> Self {
        let engine = TemplateEngine::new(pool.clone());
        Self {
            pool,
            store,
            invoker,
            engine,
            escalation,
            settings,
        }
    }

    /// The upstream contract consumed by the call layer.
    ///
    /// Never fails: render errors are converted to the generic-error
    /// audio, synthesis unavailability additionally notifies the
    /// escalation controller, and a successful render resets the call's
    /// fallback counter.
    pub async fn assemble(
        &self,
        call_id: CallId,
        agent_id: &str,
        intent_id: &str,
        bindings: &HashMap<String, String>,
        language: &str,
        latency_budget: Duration,
    ) -> AudioStream {
        match self
            .try_assemble(agent_id, intent_id, bindings, language, latency_budget)
            .await
        {
            Ok(stream) => {
                self.escalation.record_success(call_id);
                stream
            }
            Err(err) => {
                tracing::error!(
                    call_id = %call_id,
                    agent_id,
                    intent_id,
                    language,
                    error = %err,
                    "render failed, substituting generic-error audio"
                );
                if matches!(err, AssembleError::SynthesisUnavailable(_)) {
                    self.escalation.record_failure(call_id);
                }
                self.segment_audio(&self.settings.error_segment_key, language)
                    .unwrap_or_default()
            }
        }
    }

    /// The fallible render path, separated out so tests can observe the
    /// error taxonomy directly.
    pub async fn try_assemble(
        &self,
        agent_id: &str,
        intent_id: &str,
        bindings: &HashMap<String, String>,
        language: &str,
        latency_budget: Duration,
    ) -> Result<AudioStream, AssembleError> {
        let deadline = Instant::now() + latency_budget;

        let intent = {
            let conn = self.pool.get()?;
            repo::get_intent(&conn, intent_id)?
        }
        .filter(|intent| intent.active)
        .ok_or_else(|| ConfigurationError::UnknownIntent(intent_id.to_string()))?;

        if let Some(template_id) = &intent.template_id {
            return self
                .assemble_templated(agent_id, template_id, bindings, language, deadline)
                .await;
        }

        self.assemble_untemplated(&intent, agent_id, language, deadline)
            .await
    }

    async fn assemble_templated(
        &self,
        agent_id: &str,
        template_id: &str,
        bindings: &HashMap<String, String>,
        language: &str,
        deadline: Instant,
    ) -> Result<AudioStream, AssembleError> {
        let template = {
            let conn = self.pool.get()?;
            repo::get_template(&conn, template_id)?
        }
        .ok_or_else(|| ConfigurationError::UnknownTemplate(template_id.to_string()))?;

        let resolved = self.engine.render(&template, bindings, agent_id, language)?;

        let mut stream = AudioStream::default();
        for element in resolved {
            match element {
                ResolvedElement::Segment(segment) => {
                    match fs::read(self.store.audio_dir().join(&segment.audio_path)) {
                        Ok(pcm) => stream.push(&pcm, segment.duration_ms),
                        Err(err) => {
                            // A segment blob lost on disk self-heals the
                            // same way a corrupt cache entry does: the
                            // segment's source text is re-synthesized.
                            tracing::warn!(
                                agent_id,
                                segment_key = %segment.key,
                                language,
                                error = %err,
                                "segment audio unreadable, re-synthesizing from text"
                            );
                            self.resolve_or_filler(
                                &mut stream,
                                agent_id,
                                &key::response_key(agent_id, language, &segment.text),
                                CacheNamespace::Response,
                                &segment.text,
                                language,
                                deadline,
                            )
                            .await?;
                        }
                    }
                }
                ResolvedElement::Variable {
                    cache_key,
                    spoken_text,
                    ..
                } => {
                    self.resolve_or_filler(
                        &mut stream,
                        agent_id,
                        &cache_key,
                        CacheNamespace::Variable,
                        &spoken_text,
                        language,
                        deadline,
                    )
                    .await?;
                }
            }
        }

        Ok(stream)
    }

    async fn assemble_untemplated(
        &self,
        intent: &Intent,
        agent_id: &str,
        language: &str,
        deadline: Instant,
    ) -> Result<AudioStream, AssembleError> {
        match &intent.action {
            IntentAction::Static { audio_key, text } => {
                if let Some(audio_key) = audio_key {
                    if let Some(hit) = self.store.get(audio_key)? {
                        self.store.record_hit(audio_key, agent_id, hit.tts_cost)?;
                        let mut stream = AudioStream::default();
                        stream.push(&hit.pcm, hit.duration_ms);
                        return Ok(stream);
                    }
                    tracing::warn!(
                        agent_id,
                        intent_id = %intent.id,
                        audio_key,
                        "pre-rendered audio missing, falling back to text"
                    );
                }
                let text = text.as_deref().ok_or_else(|| {
                    ConfigurationError::NoRenderableResponse(intent.id.clone())
                })?;
                let mut stream = AudioStream::default();
                self.resolve_or_filler(
                    &mut stream,
                    agent_id,
                    &key::response_key(agent_id, language, text),
                    CacheNamespace::Response,
                    text,
                    language,
                    deadline,
                )
                .await?;
                Ok(stream)
            }
            IntentAction::CollectInput { reprompt_key, .. } => self
                .segment_audio(reprompt_key, language)
                .ok_or_else(|| {
                    ConfigurationError::UnknownSegment {
                        key: reprompt_key.clone(),
                        language: language.to_string(),
                    }
                    .into()
                }),
            IntentAction::Transfer { .. } => {
                // The transfer itself is the call layer's job; the rendered
                // response is the hand-off announcement.
                self.segment_audio(&self.settings.transfer_segment_key, language)
                    .ok_or_else(|| {
                        ConfigurationError::UnknownSegment {
                            key: self.settings.transfer_segment_key.clone(),
                            language: language.to_string(),
                        }
                        .into()
                    })
            }
            // KB answers and function results arrive as bindings into a
            // template; without one there is nothing to speak.
            IntentAction::KbLookup { .. } | IntentAction::FunctionCall { .. } => {
                Err(ConfigurationError::NoRenderableResponse(intent.id.clone()).into())
            }
        }
    }

    /// Resolves one unresolved key under the remaining budget, appending
    /// either the synthesized/cached audio or the please-wait filler.
    ///
    /// Provider failure (after the invoker's retry) aborts the render as
    /// `SynthesisUnavailable`; budget exhaustion only degrades this one
    /// element.
    #[allow(clippy::too_many_arguments)]
    async fn resolve_or_filler(
        &self,
        stream: &mut AudioStream,
        agent_id: &str,
        cache_key: &str,
        namespace: CacheNamespace,
        text: &str,
        language: &str,
        deadline: Instant,
    ) -> Result<(), AssembleError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            self.push_filler(stream, agent_id, cache_key, language);
            return Ok(());
        }

        let request = SynthesisRequest {
            cache_key: cache_key.to_string(),
            agent_id: agent_id.to_string(),
            namespace,
            text: text.to_string(),
            voice: self.settings.voice.clone(),
            language: language.to_string(),
            ttl_seconds: Some(self.settings.cache_ttl_seconds),
            pinned: false,
        };

        match self.invoker.resolve(&request, remaining).await {
            Ok(hit) => {
                stream.push(&hit.pcm, hit.duration_ms);
                Ok(())
            }
            Err(SynthError::BudgetExhausted(_)) => {
                self.push_filler(stream, agent_id, cache_key, language);
                Ok(())
            }
            Err(err) => Err(AssembleError::SynthesisUnavailable(err)),
        }
    }

    fn push_filler(&self, stream: &mut AudioStream, agent_id: &str, cache_key: &str, language: &str) {
        tracing::info!(
            agent_id,
            cache_key,
            language,
            "latency budget exhausted, substituting filler"
        );
        if let Some(filler) = self.segment_audio(&self.settings.filler_segment_key, language) {
            stream.push(&filler.pcm, filler.duration_ms);
        }
    }

    /// The generic-error audio for a language, for callers that fail a
    /// turn before reaching a render (a low-confidence classification).
    pub fn error_audio(&self, language: &str) -> Option<AudioStream> {
        self.segment_audio(&self.settings.error_segment_key, language)
    }

    /// Reads a pinned utility segment (filler, generic error, reprompt)
    /// for the requested language. Returns `None` when the segment or its
    /// blob is missing; callers decide whether that is fatal.
    fn segment_audio(&self, segment_key: &str, language: &str) -> Option<AudioStream> {
        let conn = self.pool.get().ok()?;
        let segment = repo::get_segment(&conn, segment_key, language).ok()??;
        match fs::read(self.store.audio_dir().join(&segment.audio_path)) {
            Ok(pcm) => {
                let mut stream = AudioStream::default();
                stream.push(&pcm, segment.duration_ms);
                Some(stream)
            }
            Err(err) => {
                tracing::warn!(
                    segment_key,
                    language,
                    error = %err,
                    "utility segment audio unreadable"
                );
                None
            }
        }
    }
}
