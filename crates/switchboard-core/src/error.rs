use thiserror::Error;

/// Authoring or binding defects that make one render impossible.
///
/// These are fatal to a single render only: the assembler converts them
/// into the configured generic-error audio and the call continues.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A template's required variable has no binding.
    #[error("missing binding for required variable '{0}'")]
    MissingBinding(String),

    /// No segment exists for the requested language. Cross-language
    /// substitution is never attempted — wrong-language audio breaks
    /// intelligibility.
    #[error("no segment '{key}' published for language '{language}'")]
    UnknownSegment {
        /// The segment key that failed to resolve.
        key: String,
        /// The language that was requested.
        language: String,
    },

    /// The intent references a template that does not exist.
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    /// The requested intent does not exist or is inactive.
    #[error("unknown intent '{0}'")]
    UnknownIntent(String),

    /// The intent has neither renderable text nor a pre-rendered audio
    /// reference.
    #[error("intent '{0}' has no renderable response")]
    NoRenderableResponse(String),

    /// The configured classifier identifier is not recognized.
    #[error("unknown classifier type '{0}'")]
    UnknownClassifier(String),
}

/// Errors raised while assembling one response.
///
/// None of these propagate past [`crate::ResponseAssembler::assemble`]:
/// the boundary converts every variant into audible fallback and logs it
/// with agent/intent/cache-key context.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// Authoring/binding defect; falls back to generic-error audio.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The provider failed even after one retry. Additionally notifies
    /// the escalation controller.
    #[error("synthesis unavailable: {0}")]
    SynthesisUnavailable(#[source] switchboard_synth::SynthError),

    /// Cache layer failure underneath a render.
    #[error(transparent)]
    Cache(#[from] switchboard_cache::CacheError),

    /// Repository failure underneath a render.
    #[error(transparent)]
    Db(#[from] switchboard_db::DbError),

    /// Could not obtain a pooled connection.
    #[error("connection error: {0}")]
    Pool(#[from] r2d2::Error),
}
