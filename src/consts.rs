//! Project-wide constants.

use std::path::PathBuf;

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
pub const HOMEPAGE: &str = env!("CARGO_PKG_HOMEPAGE");
pub const REPO: &str = env!("CARGO_PKG_REPOSITORY");

/// Default Anthropic model used for modernization.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default OpenAI speech model.
pub const DEFAULT_TTS_MODEL: &str = "tts-1";

/// Default narration voice.
pub const DEFAULT_VOICE: &str = "fable";

/// Target chunk size for modernization, in characters.
pub const DEFAULT_CHUNK_CHARS: usize = 2000;

/// Target segment size for one TTS call. The provider hard limit is 4096.
pub const DEFAULT_SEGMENT_CHARS: usize = 4000;

/// Maximum characters a single speech request may carry.
pub const TTS_INPUT_LIMIT: usize = 4096;

/// Modernization calls allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Per-chunk LLM timeout in seconds.
pub const DEFAULT_CHUNK_TIMEOUT_SECS: u64 = 120;

/// Default database path: `~/.quill/quill.db`.
/// Single DB for the library, credentials, and config.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".quill")
        .join("quill.db")
}

/// Format a number with comma separators (e.g. 1,234,567).
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// Format a dollar amount with cents and comma separators (e.g. $1,234.57).
pub fn format_usd(amount: f64) -> String {
    let cents = (amount.max(0.0) * 100.0).round() as u64;
    format!("${}.{:02}", format_number(cents / 100), cents % 100)
}
