pub mod storage;

pub use storage::AuthStorage;

use std::fmt;

use anyhow::{Context, Result, bail};
use storage::Credential;

/// Third-party APIs quill holds keys for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Text modernization (Messages API).
    Anthropic,
    /// Speech synthesis.
    OpenAi,
}

impl Provider {
    pub fn name(self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
        }
    }

    pub fn env_var(self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Save an API key for a provider.
///
/// Shared by `quill login` and anything else that collects a key.
pub fn login(db_path: &str, provider: Provider, key: &str) -> Result<()> {
    let key = key.trim();
    if key.is_empty() {
        bail!("no API key provided");
    }
    let storage = AuthStorage::open(db_path).context("failed to open auth storage")?;
    storage
        .set(
            provider.name(),
            Credential::ApiKey {
                key: key.to_string(),
            },
        )
        .context("failed to save credentials")?;
    Ok(())
}

/// Remove stored credentials for a provider.
pub fn logout(db_path: &str, provider: Provider) -> Result<()> {
    let storage = AuthStorage::open(db_path).context("failed to open auth storage")?;
    storage
        .remove(provider.name())
        .context("failed to remove credentials")?;
    Ok(())
}

/// Show only the edges of a key, e.g. `sk-a…wxyz`.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "•".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
