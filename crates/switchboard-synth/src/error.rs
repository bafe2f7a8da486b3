use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the synthesis layer.
#[derive(Debug, Error)]
pub enum SynthError {
    /// The provider failed (transport, process, or API error). The invoker
    /// retries once before surfacing this.
    #[error("TTS provider error: {0}")]
    Provider(String),

    /// The latency budget ran out before synthesis completed. The partial
    /// result is discarded and never cached.
    #[error("TTS synthesis exceeded latency budget of {0:?}")]
    BudgetExhausted(Duration),

    /// The provider was misconfigured (unknown identifier, missing
    /// endpoint or voice).
    #[error("invalid provider configuration: {0}")]
    InvalidConfiguration(String),

    /// Persisting or reading the cache failed underneath a synthesis.
    #[error(transparent)]
    Cache(#[from] switchboard_cache::CacheError),
}
