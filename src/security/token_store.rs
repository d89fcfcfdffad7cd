//! File-based session token storage
//!
//! The session is kept base64-encoded in `session.dat` under the data
//! directory. This is obfuscation only; file permissions are the protection.

use crate::error::{AppError, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const SESSION_FILE: &str = "session.dat";

/// A persisted login
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredSession {
    pub token: String,
    pub base_url: String,
    pub saved_at: DateTime<Utc>,
}

impl StoredSession {
    /// Whether the session was saved against `base_url`
    pub fn matches_base_url(&self, base_url: &str) -> bool {
        self.base_url.trim_end_matches('/') == base_url.trim_end_matches('/')
    }
}

pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved session, if any
    pub fn load(&self) -> Result<Option<StoredSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path)
            .map_err(|e| AppError::Config(format!("Failed to read session: {}", e)))?;
        decode_session(&data).map(Some)
    }

    pub fn save(&self, token: &str, base_url: &str) -> Result<StoredSession> {
        if token.trim().is_empty() {
            return Err(AppError::Validation("Token must not be empty".to_string()));
        }
        let session = StoredSession {
            token: token.trim().to_string(),
            base_url: base_url.to_string(),
            saved_at: Utc::now(),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Config(format!("Failed to create data dir: {}", e)))?;
        }
        fs::write(&self.path, encode_session(&session)?)
            .map_err(|e| AppError::Config(format!("Failed to write session: {}", e)))?;
        restrict_permissions(&self.path)?;

        Ok(session)
    }

    /// Remove the saved session. Returns whether one existed.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)?;
        Ok(true)
    }
}

fn encode_session(session: &StoredSession) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(session)?;
    Ok(base64::engine::general_purpose::STANDARD
        .encode(json)
        .into_bytes())
}

fn decode_session(data: &[u8]) -> Result<StoredSession> {
    let text = std::str::from_utf8(data)
        .map_err(|e| AppError::Config(format!("Invalid session format: {}", e)))?;
    let json = base64::engine::general_purpose::STANDARD
        .decode(text.trim())
        .map_err(|e| AppError::Config(format!("Failed to decode session: {}", e)))?;
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());

        assert_eq!(store.load().unwrap(), None);
        let saved = store.save(" abc123 ", "http://localhost:8000").unwrap();
        assert_eq!(saved.token, "abc123");

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert!(!std::fs::read_to_string(store.path()).unwrap().contains("abc123"));

        assert!(store.clear().unwrap());
        assert!(!store.clear().unwrap());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_matches_base_url_ignores_trailing_slash() {
        let dir = tempfile::tempdir().unwrap();
        let saved = TokenStore::new(dir.path())
            .save("abc123", "http://localhost:8000/")
            .unwrap();
        assert!(saved.matches_base_url("http://localhost:8000"));
        assert!(!saved.matches_base_url("http://localhost:9000"));
    }

    #[test]
    fn test_rejects_empty_token_and_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        assert!(store.save("  ", "http://localhost").is_err());

        std::fs::write(store.path(), b"not base64!").unwrap();
        assert!(matches!(store.load(), Err(AppError::Config(_))));
    }
}
