use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::Mutex;

use super::{Audio, AudioFormat, Synthesizer};

/// A synthesizer for tests. Returns deterministic bytes and records every
/// text it was asked to speak.
#[derive(Default)]
pub struct MockSynthesizer {
    calls: Mutex<Vec<(String, String)>>,
    /// Fail the call with this zero-based index.
    fail_at: Option<usize>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Self::default()
        }
    }

    /// Texts received so far, in call order.
    pub fn texts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(text, _)| text.clone())
            .collect()
    }

    /// Voices received so far, in call order.
    pub fn voices(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, voice)| voice.clone())
            .collect()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Audio> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((text.to_string(), voice.to_string()));
            calls.len() - 1
        };
        if self.fail_at == Some(index) {
            bail!("mock synthesis failure at call {index}");
        }
        Ok(Audio {
            bytes: format!("{voice}:{}", text.chars().count()).into_bytes(),
            format: AudioFormat::Mp3,
        })
    }
}
