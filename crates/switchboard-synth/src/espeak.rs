//! Local espeak-ng subprocess provider.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::SynthError;
use crate::provider::{ProviderConfig, SynthesizedAudio, TtsProvider};

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion
/// from oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Hard ceiling on process execution, independent of the caller's latency
/// budget.
const PROCESS_TIMEOUT: Duration = Duration::from_secs(60);

/// espeak-ng outputs WAV to stdout via `--stdout`; the 44-byte header is
/// stripped to return raw PCM.
const WAV_HEADER_BYTES: usize = 44;

/// TTS via a local `espeak-ng` binary.
#[derive(Debug, Clone)]
pub struct EspeakProvider {
    config: ProviderConfig,
}

impl EspeakProvider {
    /// Creates the provider. The binary is resolved from `PATH` at
    /// invocation time.
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TtsProvider for EspeakProvider {
    fn name(&self) -> &str {
        "espeak"
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        language: &str,
    ) -> Result<SynthesizedAudio, SynthError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(SynthError::Provider(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        // espeak-ng voices are language codes; an explicit voice wins over
        // the requested language.
        let voice_arg = if voice.is_empty() { language } else { voice };

        let mut command = Command::new("espeak-ng");
        command
            .arg("--stdout")
            .arg("-v")
            .arg(voice_arg)
            .arg(text)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = command
            .spawn()
            .map_err(|e| SynthError::Provider(format!("failed to spawn espeak-ng: {}", e)))?;

        let output = tokio::time::timeout(PROCESS_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                SynthError::Provider(format!(
                    "espeak-ng timed out after {} seconds",
                    PROCESS_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| SynthError::Provider(format!("failed to wait for espeak-ng: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SynthError::Provider(format!("espeak-ng failed: {}", stderr)));
        }

        let wav_data = output.stdout;
        let pcm = if wav_data.len() > WAV_HEADER_BYTES {
            wav_data[WAV_HEADER_BYTES..].to_vec()
        } else {
            wav_data
        };

        Ok(SynthesizedAudio::from_pcm(pcm, self.config.sample_rate_hz))
    }
}
