use std::sync::Mutex;

use anyhow::Result;
use log::debug;
use rusqlite::Connection;

use super::Provider;

/// Credential types stored per provider.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum Credential {
    #[serde(rename = "api_key")]
    ApiKey { key: String },
}

impl Credential {
    pub fn key(&self) -> &str {
        match self {
            Credential::ApiKey { key } => key,
        }
    }
}

/// Manages credential storage in SQLite.
///
/// Shares a database with the library and config. Pass the same path used
/// for [`Library`](crate::library::Library).
pub struct AuthStorage {
    conn: Mutex<Connection>,
}

impl AuthStorage {
    /// Open or create a credentials table in the given database path.
    /// Use `":memory:"` for tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS credentials (
                provider TEXT PRIMARY KEY,
                data     TEXT NOT NULL
            )",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get credential for a provider.
    pub fn get(&self, provider: &str) -> Result<Option<Credential>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT data FROM credentials WHERE provider = ?1")?;
        let mut rows = stmt.query([provider])?;
        match rows.next()? {
            Some(row) => {
                let json: String = row.get(0)?;
                let cred: Credential = serde_json::from_str(&json)?;
                Ok(Some(cred))
            }
            None => Ok(None),
        }
    }

    /// Store credential for a provider (upsert).
    pub fn set(&self, provider: &str, credential: Credential) -> Result<()> {
        let json = serde_json::to_string(&credential)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO credentials (provider, data) VALUES (?1, ?2)
             ON CONFLICT(provider) DO UPDATE SET data = excluded.data",
            [provider, &json],
        )?;
        Ok(())
    }

    /// Remove credential for a provider.
    pub fn remove(&self, provider: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM credentials WHERE provider = ?1", [provider])?;
        Ok(())
    }

    /// Get the API key for a provider.
    /// Priority: stored key → environment variable.
    pub fn api_key(&self, provider: Provider) -> Result<Option<String>> {
        if let Some(cred) = self.get(provider.name())? {
            debug!("using stored {} key", provider.name());
            return Ok(Some(cred.key().to_string()));
        }

        if let Ok(key) = std::env::var(provider.env_var())
            && !key.is_empty()
        {
            debug!("using {} from environment", provider.env_var());
            return Ok(Some(key));
        }

        Ok(None)
    }

    /// Describe where a provider's key would come from, for the banner.
    pub fn status(&self, provider: Provider) -> Result<String> {
        if self.get(provider.name())?.is_some() {
            return Ok("API key ✓".to_string());
        }
        let in_env = std::env::var(provider.env_var())
            .map(|k| !k.is_empty())
            .unwrap_or(false);
        Ok(if in_env {
            "API key (env) ✓".to_string()
        } else {
            "not authenticated".to_string()
        })
    }
}
