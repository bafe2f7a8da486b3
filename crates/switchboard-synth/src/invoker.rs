//! Cache-miss synthesis coordination.
//!
//! The invoker owns the singleflight discipline: concurrent requests for
//! one unresolved key collapse into a single provider invocation. Each key
//! has a flight lock; the winner synthesizes and persists, waiters acquire
//! the lock afterwards and find the entry already cached. Writes are
//! content-addressed and idempotent, so even a racing duplicate flight is
//! harmless — it just wastes a provider call, which the lock prevents.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use switchboard_cache::{CacheHit, CacheStore};
use switchboard_db::repo;
use switchboard_types::CacheNamespace;

use crate::error::SynthError;
use crate::pricing;
use crate::provider::TtsProvider;

/// One unresolved element to synthesize and cache.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    /// Content-addressed key the result lands under.
    pub cache_key: String,
    /// Owning agent.
    pub agent_id: String,
    /// Cache namespace the key was derived in.
    pub namespace: CacheNamespace,
    /// Text to synthesize.
    pub text: String,
    /// Voice identifier passed to the provider.
    pub voice: String,
    /// Language code passed to the provider.
    pub language: String,
    /// TTL for the new entry; `None` means no expiry.
    pub ttl_seconds: Option<i64>,
    /// Whether the new entry is pinned (exempt from TTL and eviction).
    pub pinned: bool,
}

type FlightLock = Arc<tokio::sync::Mutex<()>>;

/// Synthesizes and persists audio on cache miss.
pub struct TtsFallbackInvoker {
    store: CacheStore,
    provider: Arc<dyn TtsProvider>,
    flights: Mutex<HashMap<String, FlightLock>>,
}

impl TtsFallbackInvoker {
    /// Creates an invoker over the shared cache store and provider.
    pub fn new(store: CacheStore, provider: Arc<dyn TtsProvider>) -> Self {
        Self {
            store,
            provider,
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// The provider this invoker synthesizes with.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Resolves a key: cache hit if present, otherwise one synthesis under
    /// the given latency budget.
    ///
    /// Hits bump the entry's counters atomically and accrue the estimated
    /// provider cost avoided; fresh syntheses record the cost actually paid.
    ///
    /// On budget exhaustion the in-flight provider call is cancelled, its
    /// partial result is discarded (never cached), and
    /// [`SynthError::BudgetExhausted`] is returned so the caller can
    /// substitute a filler.
    pub async fn resolve(
        &self,
        request: &SynthesisRequest,
        budget: Duration,
    ) -> Result<CacheHit, SynthError> {
        if let Some(hit) = self.store.get(&request.cache_key)? {
            self.store
                .record_hit(&request.cache_key, &request.agent_id, hit.tts_cost)?;
            return Ok(hit);
        }

        let flight = self.flight_lock(&request.cache_key);
        let outcome =
            tokio::time::timeout(budget, self.synthesize_flight(&flight, request)).await;

        match outcome {
            Ok(result) => result,
            Err(_elapsed) => {
                tracing::warn!(
                    cache_key = %request.cache_key,
                    agent_id = %request.agent_id,
                    budget_ms = budget.as_millis() as u64,
                    "synthesis exceeded latency budget, discarding"
                );
                Err(SynthError::BudgetExhausted(budget))
            }
        }
    }

    fn flight_lock(&self, cache_key: &str) -> FlightLock {
        let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());
        flights
            .entry(cache_key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Retires a completed flight's map entry.
    ///
    /// Only called while holding the flight lock, so the entry being
    /// removed cannot belong to a still-synthesizing flight. A caller
    /// whose timeout fires while queued on the lock never reaches here
    /// and must leave the entry in place for the winner; removing it
    /// would let a fresh request open a duplicate flight for the key.
    fn retire_flight(&self, cache_key: &str, flight: &FlightLock) {
        let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = flights.get(cache_key) {
            if Arc::ptr_eq(current, flight) {
                flights.remove(cache_key);
            }
        }
    }

    async fn synthesize_flight(
        &self,
        flight: &FlightLock,
        request: &SynthesisRequest,
    ) -> Result<CacheHit, SynthError> {
        let _guard = flight.lock().await;
        let result = self.synthesize_locked(request).await;
        if result.is_ok() {
            // On failure the entry stays so retrying callers keep
            // serializing through one lock instead of racing the provider.
            self.retire_flight(&request.cache_key, flight);
        }
        result
    }

    async fn synthesize_locked(
        &self,
        request: &SynthesisRequest,
    ) -> Result<CacheHit, SynthError> {
        // Another flight may have landed this key while we waited; that
        // still counts as a hit for this caller.
        if let Some(hit) = self.store.get(&request.cache_key)? {
            self.store
                .record_hit(&request.cache_key, &request.agent_id, hit.tts_cost)?;
            return Ok(hit);
        }

        let audio = match self
            .provider
            .synthesize(&request.text, &request.voice, &request.language)
            .await
        {
            Ok(audio) => audio,
            Err(first_err) => {
                tracing::warn!(
                    cache_key = %request.cache_key,
                    agent_id = %request.agent_id,
                    error = %first_err,
                    "synthesis failed, retrying once"
                );
                self.provider
                    .synthesize(&request.text, &request.voice, &request.language)
                    .await
                    .map_err(|retry_err| {
                        tracing::error!(
                            cache_key = %request.cache_key,
                            agent_id = %request.agent_id,
                            error = %retry_err,
                            "synthesis failed after retry"
                        );
                        retry_err
                    })?
            }
        };

        let cost = pricing::synthesis_cost(self.provider.name(), request.text.chars().count());

        self.store.put(
            &request.cache_key,
            &request.agent_id,
            request.namespace,
            &audio.pcm,
            audio.duration_ms,
            cost,
            request.ttl_seconds,
            request.pinned,
        )?;

        let conn = self.store.pool().get().map_err(switchboard_cache::CacheError::from)?;
        repo::add_synthesis_cost(&conn, &request.agent_id, cost)
            .map_err(switchboard_cache::CacheError::from)?;

        Ok(CacheHit {
            cache_key: request.cache_key.clone(),
            pcm: audio.pcm,
            duration_ms: audio.duration_ms,
            tts_cost: cost,
        })
    }
}
