use anyhow::{Result, bail};
use async_trait::async_trait;
use log::debug;
use serde::Serialize;

use crate::auth::{AuthStorage, Provider};
use crate::consts::{DEFAULT_TTS_MODEL, TTS_INPUT_LIMIT};

use super::{Audio, AudioFormat, Synthesizer};

const API_URL: &str = "https://api.openai.com/v1/audio/speech";

/// Voices the speech endpoint accepts.
pub const VOICES: &[&str] = &[
    "alloy", "ash", "ballad", "coral", "echo", "fable", "nova", "onyx", "sage", "shimmer",
];

/// Synthesizes speech through OpenAI's `/v1/audio/speech` endpoint.
pub struct OpenAiSynthesizer {
    model: String,
    auth: AuthStorage,
    client: reqwest::Client,
}

impl OpenAiSynthesizer {
    pub fn new(model: Option<String>, auth: AuthStorage) -> Self {
        Self {
            model: model.unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            auth,
            client: reqwest::Client::new(),
        }
    }

    fn validate(text: &str, voice: &str) -> Result<()> {
        let len = text.chars().count();
        if len == 0 {
            bail!("nothing to synthesize");
        }
        if len > TTS_INPUT_LIMIT {
            bail!("segment is {len} characters; the speech API accepts at most {TTS_INPUT_LIMIT}");
        }
        if !VOICES.contains(&voice) {
            bail!("unknown voice `{voice}` (expected one of: {})", VOICES.join(", "));
        }
        Ok(())
    }
}

#[async_trait]
impl Synthesizer for OpenAiSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Audio> {
        Self::validate(text, voice)?;

        let api_key = self.auth.api_key(Provider::OpenAi)?.ok_or_else(|| {
            anyhow::anyhow!(
                "no OpenAI credentials found. Run `quill login openai` or set OPENAI_API_KEY."
            )
        })?;

        let body = SpeechRequest {
            model: &self.model,
            input: text,
            voice,
            response_format: AudioFormat::Mp3.extension(),
        };

        let resp = self
            .client
            .post(API_URL)
            .bearer_auth(&api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("OpenAI speech API error ({}): {}", status, text);
        }

        let bytes = resp.bytes().await?.to_vec();
        debug!("synthesized {} chars into {} bytes", text.len(), bytes.len());

        Ok(Audio {
            bytes,
            format: AudioFormat::Mp3,
        })
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_text() {
        assert!(OpenAiSynthesizer::validate("", "fable").is_err());
    }

    #[test]
    fn rejects_oversized_text() {
        let text = "a".repeat(TTS_INPUT_LIMIT + 1);
        let err = OpenAiSynthesizer::validate(&text, "fable").unwrap_err();
        assert!(err.to_string().contains("at most"));
    }

    #[test]
    fn accepts_text_at_limit() {
        let text = "a".repeat(TTS_INPUT_LIMIT);
        assert!(OpenAiSynthesizer::validate(&text, "nova").is_ok());
    }

    #[test]
    fn rejects_unknown_voice() {
        let err = OpenAiSynthesizer::validate("hi", "gravel").unwrap_err();
        assert!(err.to_string().contains("gravel"));
    }

    #[test]
    fn request_serializes_expected_fields() {
        let body = SpeechRequest {
            model: "tts-1",
            input: "Hello.",
            voice: "fable",
            response_format: "mp3",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "tts-1");
        assert_eq!(json["input"], "Hello.");
        assert_eq!(json["voice"], "fable");
        assert_eq!(json["response_format"], "mp3");
    }
}
