//! Response assembly for the Switchboard IVR platform.
//!
//! This crate orchestrates the synthesis pipeline: a classified intent
//! plus extracted variable bindings become a playable [`AudioStream`],
//! with cache lookups in front of the paid TTS provider, a hard per-call
//! latency budget, and a per-call fallback/escalation state machine.
//!
//! The upstream contract consumed by the call layer is
//! [`ResponseAssembler::assemble`]; every per-render error is caught at
//! that boundary and converted into a safe audible fallback, so no render
//! failure ever terminates the call-handling loop.
//!
//! [`AudioStream`]: switchboard_types::AudioStream

pub mod assembler;
pub mod classifier;
pub mod config;
pub mod error;
pub mod escalation;
pub mod pipeline;
pub mod template;

pub use assembler::{AssemblerSettings, ResponseAssembler};
pub use classifier::{create_classifier, Classifier, KeywordClassifier};
pub use config::{
    CacheSettings, DatabaseSettings, LoggingSettings, ProviderSettings, SwitchboardConfig,
};
pub use error::{AssembleError, ConfigurationError};
pub use escalation::{
    EscalationSettings, FallbackEscalationController, FallbackPhase, TransferSignal,
};
pub use pipeline::{Pipeline, PipelineError};
pub use template::{ResolvedElement, TemplateEngine};
