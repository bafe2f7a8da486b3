//! Generic JSON-over-HTTP synthesis provider.
//!
//! Speaks a minimal request shape shared by hosted TTS gateways: POST the
//! text, voice, language, and output format as JSON; receive raw PCM bytes
//! back. Authentication is a bearer token when an API key is configured.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SynthError;
use crate::provider::{ProviderConfig, SynthesizedAudio, TtsProvider};

#[derive(Debug, Serialize)]
struct SynthesisBody<'a> {
    text: &'a str,
    voice: &'a str,
    language: &'a str,
    format: &'static str,
    sample_rate: u32,
}

/// TTS via a hosted HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpTtsProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    sample_rate_hz: u32,
}

impl HttpTtsProvider {
    /// Creates the provider. Fails if no endpoint is configured.
    pub fn new(config: ProviderConfig) -> Result<Self, SynthError> {
        let endpoint = config.endpoint.ok_or_else(|| {
            SynthError::InvalidConfiguration("http provider requires an endpoint".to_string())
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key: config.api_key,
            sample_rate_hz: config.sample_rate_hz,
        })
    }
}

#[async_trait]
impl TtsProvider for HttpTtsProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        language: &str,
    ) -> Result<SynthesizedAudio, SynthError> {
        let body = SynthesisBody {
            text,
            voice,
            language,
            format: "pcm_s16le",
            sample_rate: self.sample_rate_hz,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SynthError::Provider(format!("synthesis request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(SynthError::Provider(format!(
                "synthesis endpoint returned {status}: {detail}"
            )));
        }

        let pcm = response
            .bytes()
            .await
            .map_err(|e| SynthError::Provider(format!("failed to read synthesis body: {}", e)))?
            .to_vec();

        Ok(SynthesizedAudio::from_pcm(pcm, self.sample_rate_hz))
    }
}
