use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TOKEN_ENV: &str = "GCHAT_TOKEN";

/// How close to expiry a token may get before it is refreshed.
const EXPIRY_LEEWAY_SECONDS: i64 = 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("OAuth callback error: {0}")]
    Callback(String),
    #[error("token endpoint rejected the request: {0}")]
    TokenEndpoint(String),
    #[error(
        "OAuth2 client credentials are not configured; pass --client-id and --client-secret, \
         set GCHAT_CLIENT_ID and GCHAT_CLIENT_SECRET, or add them to config.json"
    )]
    MissingClientCredentials,
    #[error("not logged in; run `gchat auth login` or set GCHAT_TOKEN")]
    NotLoggedIn,
    #[error("login cancelled")]
    Cancelled,
}

/// An OAuth2 token as persisted on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl StoredToken {
    /// Tokens without an expiry never count as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_LEEWAY_SECONDS) <= now,
            None => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }
}

/// Reads a bearer token from `GCHAT_TOKEN`, ignoring blank values.
pub fn env_token() -> Option<String> {
    env::var(TOKEN_ENV)
        .ok()
        .filter(|token| !token.trim().is_empty())
}

pub struct AuthStore {
    path: PathBuf,
}

impl AuthStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<StoredToken>, AuthError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AuthError::Io(err)),
        };
        let token: StoredToken = serde_json::from_str(&contents)?;
        if token.access_token.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(token))
    }

    pub fn store(&self, token: &StoredToken) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }
        let payload = serde_json::to_string_pretty(token)?;
        fs::write(&self.path, payload)?;
        set_file_permissions(&self.path, 0o600)?;
        Ok(())
    }

    /// Returns whether a token file was removed.
    pub fn clear(&self) -> Result<bool, AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(AuthError::Io(err)),
        }
    }
}

fn ensure_dir(path: &Path) -> Result<(), io::Error> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(path)?;
    set_dir_permissions(path, 0o700)?;
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path, mode: u32) -> Result<(), io::Error> {
    use std::os::unix::fs::PermissionsExt;
    let perm = fs::Permissions::from_mode(mode);
    fs::set_permissions(path, perm)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path, mode: u32) -> Result<(), io::Error> {
    use std::os::unix::fs::PermissionsExt;
    let perm = fs::Permissions::from_mode(mode);
    fs::set_permissions(path, perm)
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path, _mode: u32) -> Result<(), io::Error> {
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path, _mode: u32) -> Result<(), io::Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn token(expiry: Option<DateTime<Utc>>) -> StoredToken {
        StoredToken {
            access_token: "ya29.token".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expiry,
        }
    }

    #[test]
    fn store_round_trips_and_restricts_permissions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = AuthStore::new(dir.path().join("nested").join("token.json"));
        assert!(store.load().expect("load").is_none());

        let expiry = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single();
        store.store(&token(expiry)).expect("store");
        assert_eq!(store.load().expect("load"), Some(token(expiry)));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(store.path()).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        assert!(store.clear().expect("clear"));
        assert!(!store.clear().expect("clear twice"));
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    fn tokens_expiring_within_a_minute_are_expired() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("now");
        assert!(token(Some(now + Duration::seconds(30))).is_expired_at(now));
        assert!(token(Some(now - Duration::seconds(1))).is_expired_at(now));
        assert!(!token(Some(now + Duration::seconds(120))).is_expired_at(now));
        assert!(!token(None).is_expired_at(now));
    }

    #[test]
    fn missing_token_type_defaults_to_bearer() {
        let parsed: StoredToken = serde_json::from_str(r#"{"access_token":"abc"}"#).expect("parse");
        assert_eq!(parsed.token_type, "Bearer");
        assert!(!parsed.can_refresh());
    }
}
