//! Text-to-speech synthesis for the Switchboard IVR platform.
//!
//! The provider seam is a trait selected by identifier, so the core never
//! branches on a provider string outside the factory. On a cache miss the
//! [`TtsFallbackInvoker`] coordinates synthesis: concurrent requests for
//! one key collapse into a single provider call (singleflight), failures
//! are retried once, and every invocation is bounded by the caller's
//! remaining latency budget.

pub mod error;
pub mod espeak;
pub mod http;
pub mod invoker;
pub mod pricing;
pub mod provider;

pub use error::SynthError;
pub use espeak::EspeakProvider;
pub use http::HttpTtsProvider;
pub use invoker::{SynthesisRequest, TtsFallbackInvoker};
pub use pricing::{synthesis_cost, ProviderRate, RateUnit};
pub use provider::{create_provider, ProviderConfig, SynthesizedAudio, TtsProvider};
