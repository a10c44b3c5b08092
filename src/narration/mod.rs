pub mod mock;
pub mod openai;
pub mod segment;

use anyhow::Result;
use async_trait::async_trait;

/// Encoding of synthesized audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
        }
    }
}

/// Encoded audio for one segment.
#[derive(Debug, Clone)]
pub struct Audio {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
}

/// Turns text into speech. Could be a TTS API or a test double.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Audio>;
}
