//! File-based configuration.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use switchboard_db::PoolSettings;
use switchboard_synth::ProviderConfig;

fn default_db_path() -> String {
    "switchboard.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    3_000
}

fn default_max_connections() -> u32 {
    16
}

fn default_audio_dir() -> String {
    "audio".to_string()
}

fn default_classifier() -> String {
    "keyword".to_string()
}

fn default_provider_kind() -> String {
    "espeak".to_string()
}

fn default_voice() -> String {
    "en".to_string()
}

fn default_sample_rate_hz() -> u32 {
    22_050
}

fn default_latency_budget_ms() -> u64 {
    2_000
}

fn default_max_fallback_count() -> u32 {
    3
}

fn default_transfer_queue() -> String {
    "default".to_string()
}

fn default_filler_key() -> String {
    "please_wait".to_string()
}

fn default_error_key() -> String {
    "generic_error".to_string()
}

fn default_transfer_audio_key() -> String {
    "transfer_to_agent".to_string()
}

fn default_ttl_seconds() -> i64 {
    30 * 24 * 3600
}

fn default_high_water_bytes() -> i64 {
    512 * 1024 * 1024
}

fn default_low_water_bytes() -> i64 {
    384 * 1024 * 1024
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output configuration for the daemon binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Tracing filter directive, e.g. `info` or `switchboard_core=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Connection pool tunables for the agent database.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// How long a connection waits on a locked database, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Upper bound on pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseSettings {
    /// Converts to the db crate's pool settings.
    pub fn to_pool_settings(self) -> PoolSettings {
        PoolSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            max_connections: self.max_connections,
        }
    }
}

/// TTS provider selection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Provider identifier consumed by the synthesis factory.
    #[serde(default = "default_provider_kind")]
    pub kind: String,
    /// Default voice identifier.
    #[serde(default = "default_voice")]
    pub voice: String,
    /// API endpoint, for HTTP providers.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// API key, for HTTP providers.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Output sample rate in Hz.
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            voice: default_voice(),
            endpoint: None,
            api_key: None,
            sample_rate_hz: default_sample_rate_hz(),
        }
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("kind", &self.kind)
            .field("voice", &self.voice)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("sample_rate_hz", &self.sample_rate_hz)
            .finish()
    }
}

impl ProviderSettings {
    /// Converts to the synthesis crate's provider configuration.
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            voice: self.voice.clone(),
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            sample_rate_hz: self.sample_rate_hz,
        }
    }
}

/// Cache TTL and storage-budget tunables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheSettings {
    /// TTL applied to unpinned entries, in seconds.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: i64,
    /// Per-agent storage high-water mark in bytes.
    #[serde(default = "default_high_water_bytes")]
    pub high_water_bytes: i64,
    /// Per-agent storage low-water mark in bytes.
    #[serde(default = "default_low_water_bytes")]
    pub low_water_bytes: i64,
    /// Pause between eviction sweeps, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            high_water_bytes: default_high_water_bytes(),
            low_water_bytes: default_low_water_bytes(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchboardConfig {
    /// SQLite database path.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Audio blob directory.
    #[serde(default = "default_audio_dir")]
    pub audio_dir: String,
    /// Agent database pool tunables.
    #[serde(default)]
    pub database: DatabaseSettings,
    /// Classifier identifier consumed by the classifier factory.
    #[serde(default = "default_classifier")]
    pub classifier: String,
    /// Log output configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
    /// TTS provider selection.
    #[serde(default)]
    pub provider: ProviderSettings,
    /// Cache tunables.
    #[serde(default)]
    pub cache: CacheSettings,
    /// Default per-assemble latency ceiling in milliseconds.
    #[serde(default = "default_latency_budget_ms")]
    pub latency_budget_ms: u64,
    /// Consecutive failures before escalation.
    #[serde(default = "default_max_fallback_count")]
    pub max_fallback_count: u32,
    /// Destination queue for escalated calls.
    #[serde(default = "default_transfer_queue")]
    pub transfer_queue: String,
    /// Segment key of the please-wait filler.
    #[serde(default = "default_filler_key")]
    pub filler_segment_key: String,
    /// Segment key of the generic-error audio.
    #[serde(default = "default_error_key")]
    pub error_segment_key: String,
    /// Audio key played before a human transfer.
    #[serde(default = "default_transfer_audio_key")]
    pub transfer_audio_key: String,
}

impl Default for SwitchboardConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            audio_dir: default_audio_dir(),
            database: DatabaseSettings::default(),
            classifier: default_classifier(),
            logging: LoggingSettings::default(),
            provider: ProviderSettings::default(),
            cache: CacheSettings::default(),
            latency_budget_ms: default_latency_budget_ms(),
            max_fallback_count: default_max_fallback_count(),
            transfer_queue: default_transfer_queue(),
            filler_segment_key: default_filler_key(),
            error_segment_key: default_error_key(),
            transfer_audio_key: default_transfer_audio_key(),
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for this shape.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl SwitchboardConfig {
    /// Loads configuration from a TOML file. Every field has a default,
    /// so an empty file is a valid configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
