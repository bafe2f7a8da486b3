//! The TTS provider seam.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SynthError;
use crate::espeak::EspeakProvider;
use crate::http::HttpTtsProvider;

/// Raw output of one provider invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    /// Raw PCM (s16le) at the provider's configured sample rate.
    pub pcm: Vec<u8>,
    /// Playback duration in milliseconds, derived from the PCM length.
    pub duration_ms: i64,
}

impl SynthesizedAudio {
    /// Builds the result from raw PCM, deriving duration from the sample
    /// rate (s16le mono: two bytes per sample).
    pub fn from_pcm(pcm: Vec<u8>, sample_rate_hz: u32) -> Self {
        let samples = pcm.len() as i64 / 2;
        let duration_ms = samples * 1000 / i64::from(sample_rate_hz.max(1));
        Self { pcm, duration_ms }
    }
}

/// Configuration shared by all provider implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Default voice identifier, overridable per call.
    pub voice: String,
    /// API endpoint, for HTTP providers.
    pub endpoint: Option<String>,
    /// API key, for HTTP providers.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Output sample rate in Hz.
    pub sample_rate_hz: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            voice: "en".to_string(),
            endpoint: None,
            api_key: None,
            sample_rate_hz: 22_050,
        }
    }
}

/// A text-to-speech backend.
///
/// Implementations must be safe to share across every concurrent call
/// context; the invoker holds one instance behind an `Arc`.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Provider identifier used for pricing lookup and diagnostics.
    fn name(&self) -> &str;

    /// Synthesizes `text` in `voice` for `language`, returning raw PCM.
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        language: &str,
    ) -> Result<SynthesizedAudio, SynthError>;
}

/// Factory: creates a TTS provider by identifier.
///
/// # Supported providers
///
/// - `"espeak"` or `"espeak-ng"` — local espeak-ng subprocess
/// - `"http"` — generic JSON-over-HTTP synthesis endpoint
pub fn create_provider(
    provider_type: &str,
    config: ProviderConfig,
) -> Result<Arc<dyn TtsProvider>, SynthError> {
    match provider_type.to_lowercase().as_str() {
        "espeak" | "espeak-ng" | "espeak_ng" => Ok(Arc::new(EspeakProvider::new(config))),
        "http" => Ok(Arc::new(HttpTtsProvider::new(config)?)),
        _ => Err(SynthError::InvalidConfiguration(format!(
            "unsupported TTS provider: {provider_type}. Supported providers: espeak, http"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_derived_from_sample_rate() {
        // 22050 Hz s16le: 44100 bytes per second of audio.
        let audio = SynthesizedAudio::from_pcm(vec![0u8; 44_100], 22_050);
        assert_eq!(audio.duration_ms, 1_000);

        let audio = SynthesizedAudio::from_pcm(vec![0u8; 22_050], 22_050);
        assert_eq!(audio.duration_ms, 500);
    }

    #[test]
    fn factory_rejects_unknown_provider() {
        let result = create_provider("acoustic-modem", ProviderConfig::default());
        match result {
            Err(SynthError::InvalidConfiguration(msg)) => {
                assert!(msg.contains("acoustic-modem"))
            }
            _ => panic!("expected InvalidConfiguration"),
        }
    }

    #[test]
    fn factory_accepts_espeak_aliases() {
        for alias in ["espeak", "espeak-ng", "ESPEAK_NG"] {
            let provider = create_provider(alias, ProviderConfig::default())
                .expect("espeak alias should resolve");
            assert_eq!(provider.name(), "espeak");
        }
    }
}
