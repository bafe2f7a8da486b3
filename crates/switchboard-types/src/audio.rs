//! Assembled audio output.

use serde::{Deserialize, Serialize};

/// A fully assembled response, ready for the telephony layer.
///
/// Audio is raw PCM (s16le) at the sample rate the agent's provider was
/// configured with; parts are concatenated in template order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioStream {
    /// Concatenated raw PCM bytes.
    pub pcm: Vec<u8>,
    /// Total playback duration in milliseconds.
    pub duration_ms: i64,
}

impl AudioStream {
    /// Appends one resolved element's audio, preserving playback order.
    pub fn push(&mut self, pcm: &[u8], duration_ms: i64) {
        self.pcm.extend_from_slice(pcm);
        self.duration_ms += duration_ms;
    }

    /// Returns true if nothing was assembled.
    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }
}
