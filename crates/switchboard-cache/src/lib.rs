//! Content-addressed audio caching for the Switchboard IVR platform.
//!
//! Previously synthesized audio is cached in two namespaces sharing one
//! mechanism: whole response phrases and single variable values. Keys are
//! derived from a deterministic, format-aware normalization so phonetically
//! identical inputs ("3" and "three" under spell-digits) collide to one
//! entry, then content-addressed with SHA-256.
//!
//! The [`eviction`] module enforces a per-agent storage budget as a
//! background sweep, off the synthesis hot path.

pub mod error;
pub mod eviction;
pub mod key;
pub mod store;

pub use error::CacheError;
pub use eviction::{EvictionPolicy, EvictionSettings, SweepReport};
pub use key::{normalize, normalize_text, response_key, spoken_form, variable_key};
pub use store::{CacheHit, CacheStore};
