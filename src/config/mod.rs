//! Key-value configuration storage backed by SQLite.
//!
//! Shares a database with [`AuthStorage`](crate::auth::AuthStorage) and
//! [`Library`](crate::library::Library). Pass the same path to all three.

use anyhow::{Context, Result, bail};
use log::debug;
use rusqlite::Connection;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use crate::consts::{
    DEFAULT_CHUNK_CHARS, DEFAULT_CHUNK_TIMEOUT_SECS, DEFAULT_CONCURRENCY, DEFAULT_MODEL,
    DEFAULT_SEGMENT_CHARS, DEFAULT_TTS_MODEL, DEFAULT_VOICE, TTS_INPUT_LIMIT,
};
use crate::cost::Pricing;

/// Keys understood by [`Settings::load`].
pub const KNOWN_KEYS: &[&str] = &[
    "model",
    "tts_model",
    "voice",
    "chunk_size",
    "segment_size",
    "concurrency",
    "chunk_timeout_secs",
    "price_input",
    "price_output",
    "price_tts",
];

/// Persistent key-value configuration store.
pub struct Config {
    conn: Mutex<Connection>,
}

impl Config {
    /// Open or create the config table in the given database.
    /// Use `":memory:"` for tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open config database")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS config (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .context("failed to create config table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get a config value by key.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT value FROM config WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Set a config value (upsert).
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    /// Remove a config key.
    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM config WHERE key = ?1", [key])?;
        Ok(())
    }

    /// Parse a stored value, naming the key on failure.
    fn parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key)? {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("invalid value for config key `{key}`: {raw:?} ({e})")),
            None => Ok(None),
        }
    }
}

/// Effective settings: stored config over built-in defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub model: String,
    pub tts_model: String,
    pub voice: String,
    pub chunk_size: usize,
    pub segment_size: usize,
    pub concurrency: usize,
    pub chunk_timeout: Duration,
    pub pricing: Pricing,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            chunk_size: DEFAULT_CHUNK_CHARS,
            segment_size: DEFAULT_SEGMENT_CHARS,
            concurrency: DEFAULT_CONCURRENCY,
            chunk_timeout: Duration::from_secs(DEFAULT_CHUNK_TIMEOUT_SECS),
            pricing: Pricing::default(),
        }
    }
}

impl Settings {
    pub fn load(config: &Config) -> Result<Self> {
        let defaults = Self::default();
        let settings = Self {
            model: config.get("model")?.unwrap_or(defaults.model),
            tts_model: config.get("tts_model")?.unwrap_or(defaults.tts_model),
            voice: config.get("voice")?.unwrap_or(defaults.voice),
            chunk_size: config.parsed("chunk_size")?.unwrap_or(defaults.chunk_size),
            segment_size: config.parsed("segment_size")?.unwrap_or(defaults.segment_size),
            concurrency: config.parsed("concurrency")?.unwrap_or(defaults.concurrency),
            chunk_timeout: config
                .parsed("chunk_timeout_secs")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.chunk_timeout),
            pricing: Pricing {
                input_per_mtok: config
                    .parsed("price_input")?
                    .unwrap_or(defaults.pricing.input_per_mtok),
                output_per_mtok: config
                    .parsed("price_output")?
                    .unwrap_or(defaults.pricing.output_per_mtok),
                tts_per_mchar: config
                    .parsed("price_tts")?
                    .unwrap_or(defaults.pricing.tts_per_mchar),
            },
        };
        settings.validate()?;
        debug!("loaded settings: {settings:?}");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be greater than zero");
        }
        if self.segment_size == 0 || self.segment_size > TTS_INPUT_LIMIT {
            bail!("segment_size must be between 1 and {TTS_INPUT_LIMIT}");
        }
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.chunk_timeout.is_zero() {
            bail!("chunk_timeout_secs must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_config() -> Config {
        Config::open(":memory:").unwrap()
    }

    #[test]
    fn get_returns_none_for_missing_key() {
        let config = mem_config();
        assert!(config.get("nonexistent").unwrap().is_none());
    }

    #[test]
    fn set_overwrites_existing() {
        let config = mem_config();
        config.set("voice", "alloy").unwrap();
        config.set("voice", "onyx").unwrap();
        assert_eq!(config.get("voice").unwrap().unwrap(), "onyx");
    }

    #[test]
    fn remove_deletes_key() {
        let config = mem_config();
        config.set("voice", "alloy").unwrap();
        config.remove("voice").unwrap();
        assert!(config.get("voice").unwrap().is_none());
        config.remove("voice").unwrap();
    }

    #[test]
    fn persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config-test.db");
        let path_str = path.to_str().unwrap();

        {
            let config = Config::open(path_str).unwrap();
            config.set("chunk_size", "1500").unwrap();
        }

        {
            let config = Config::open(path_str).unwrap();
            assert_eq!(config.get("chunk_size").unwrap().unwrap(), "1500");
        }
    }

    #[test]
    fn settings_default_when_empty() {
        let settings = Settings::load(&mem_config()).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn settings_read_stored_values() {
        let config = mem_config();
        config.set("model", "claude-opus-4-20250514").unwrap();
        config.set("chunk_size", " 1500 ").unwrap();
        config.set("concurrency", "8").unwrap();
        config.set("chunk_timeout_secs", "5").unwrap();
        config.set("price_tts", "30").unwrap();

        let settings = Settings::load(&config).unwrap();
        assert_eq!(settings.model, "claude-opus-4-20250514");
        assert_eq!(settings.chunk_size, 1500);
        assert_eq!(settings.concurrency, 8);
        assert_eq!(settings.chunk_timeout, Duration::from_secs(5));
        assert_eq!(settings.pricing.tts_per_mchar, 30.0);
        assert_eq!(settings.pricing.input_per_mtok, 3.0);
    }

    #[test]
    fn bad_value_names_key() {
        let config = mem_config();
        config.set("concurrency", "lots").unwrap();
        let err = Settings::load(&config).unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn oversized_segments_rejected() {
        let config = mem_config();
        config.set("segment_size", "5000").unwrap();
        assert!(Settings::load(&config).is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = mem_config();
        config.set("chunk_timeout_secs", "0").unwrap();
        let err = Settings::load(&config).unwrap_err();
        assert!(err.to_string().contains("chunk_timeout_secs"));
    }
}
