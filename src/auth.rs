//! Credential record kept on behalf of the login collaborator
//!
//! The cookie jar is produced elsewhere (browser import, login flow) and is only ever
//! passed to the engine as a path. `auth.json` caches who logged in; whether a login is
//! active is always re-derived from the cookie file actually being there.

use crate::config::PersistenceConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of `auth.json`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRecord {
    /// Last known login state
    #[serde(default)]
    pub logged_in: bool,
    /// Account the cookies belong to
    #[serde(default)]
    pub email: Option<String>,
    /// When the record was last written
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Cookie jar location plus the cached login record
#[derive(Clone, Debug)]
pub struct CredentialStore {
    cookies: PathBuf,
    record_path: PathBuf,
    record: AuthRecord,
}

impl CredentialStore {
    /// Load the record from the data directory; a missing or corrupt file yields an empty record
    pub fn open(config: &PersistenceConfig) -> Self {
        let record_path = config.auth_file();
        let record = load_record(&record_path);
        Self {
            cookies: config.cookies_file(),
            record_path,
            record,
        }
    }

    /// Where the collaborator should place the cookie jar
    pub fn cookies_file(&self) -> &Path {
        &self.cookies
    }

    /// Cookie jar to pass to the engine, if one exists
    pub fn cookies_path(&self) -> Option<PathBuf> {
        self.cookies.is_file().then(|| self.cookies.clone())
    }

    /// Logged in means a cookie jar is present, whatever the cached record says
    pub fn is_logged_in(&self) -> bool {
        self.cookies.is_file()
    }

    /// Account name from the cached record, when logged in
    pub fn email(&self) -> Option<&str> {
        if self.is_logged_in() {
            self.record.email.as_deref()
        } else {
            None
        }
    }

    /// Cached record as last loaded or written
    pub fn record(&self) -> &AuthRecord {
        &self.record
    }

    /// Record a successful login
    pub fn mark_logged_in(&mut self, email: Option<String>) {
        self.record = AuthRecord {
            logged_in: true,
            email,
            updated_at: Some(Utc::now()),
        };
        self.save();
    }

    /// Forget the login and remove the cookie jar
    pub fn logout(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.cookies)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(error = %e, path = %self.cookies.display(), "could not remove cookie file");
        }
        self.record = AuthRecord {
            logged_in: false,
            email: None,
            updated_at: Some(Utc::now()),
        };
        self.save();
    }

    fn save(&self) {
        if let Some(parent) = self.record_path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            tracing::warn!(error = %e, "could not create data directory for auth record");
            return;
        }
        let json = match serde_json::to_string_pretty(&self.record) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "could not serialize auth record");
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.record_path, json) {
            tracing::warn!(error = %e, path = %self.record_path.display(), "could not write auth record");
        }
    }
}

fn load_record(path: &Path) -> AuthRecord {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return AuthRecord::default(),
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "could not read auth record");
            return AuthRecord::default();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, path = %path.display(), "ignoring corrupt auth record");
        AuthRecord::default()
    })
}
