//! Encrypted, lazily loaded access/refresh token pair.
//!
//! The store holds one [`Credentials`] value (or nothing). The file on disk is
//! the [`SecureStorage`] encryption of the JSON-encoded credentials and is
//! replaced atomically on every save. The first read decrypts the file and
//! caches the result; later reads never touch the disk.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::secure::SecureStorage;
use crate::error::{FinsyncError, Result};

/// Access and refresh token issued together.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Credentials {
    /// Whether the access token expires within `leeway` of `now`.
    #[must_use]
    pub fn expires_within(&self, leeway: Duration, now: DateTime<Utc>) -> bool {
        let leeway = chrono::Duration::from_std(leeway).unwrap_or(chrono::Duration::MAX);
        now.checked_add_signed(leeway)
            .is_none_or(|deadline| self.expires_at <= deadline)
    }
}

enum Slot {
    Unloaded,
    Loaded(Option<Credentials>),
}

/// Single owner of the current token pair.
pub struct TokenStore {
    path: PathBuf,
    secure: Arc<dyn SecureStorage>,
    slot: Mutex<Slot>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").field("path", &self.path).finish_non_exhaustive()
    }
}

impl TokenStore {
    /// Create a store backed by `path`. Nothing is read until first access.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, secure: Arc<dyn SecureStorage>) -> Self {
        Self {
            path: path.into(),
            secure,
            slot: Mutex::new(Slot::Unloaded),
        }
    }

    /// Path of the encrypted credentials file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current access token.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.with_credentials(|c| c.map(|c| c.access_token.clone()))
    }

    /// Current refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.with_credentials(|c| c.map(|c| c.refresh_token.clone()))
    }

    /// Expiry of the current access token.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.with_credentials(|c| c.map(|c| c.expires_at))
    }

    /// Snapshot of the whole token pair.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        self.with_credentials(|c| c.cloned())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.with_credentials(|c| c.is_some())
    }

    /// Whether a token is stored and it expires within `leeway`.
    #[must_use]
    pub fn needs_refresh(&self, leeway: Duration) -> bool {
        self.with_credentials(|c| c.is_some_and(|c| c.expires_within(leeway, Utc::now())))
    }

    /// Encrypt, persist, and publish a new token pair.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption or the file write fails; the in-memory
    /// value is left unchanged in that case.
    pub fn save(
        &self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let credentials = Credentials {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        };
        let plaintext = serde_json::to_string(&credentials)?;
        let sealed = self
            .secure
            .encrypt(&plaintext)
            .ok_or_else(|| FinsyncError::SecureStorage("failed to encrypt credentials".into()))?;

        let mut slot = self.lock();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_atomic(&self.path, sealed.as_bytes())?;
        *slot = Slot::Loaded(Some(credentials));
        drop(slot);

        debug!(path = %self.path.display(), %expires_at, "Credentials saved");
        Ok(())
    }

    /// Forget the token pair in memory and on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials file exists but cannot be removed.
    /// Memory is cleared regardless.
    pub fn clear(&self) -> Result<()> {
        let mut slot = self.lock();
        *slot = Slot::Loaded(None);
        let removed = match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        };
        drop(slot);

        debug!(path = %self.path.display(), "Credentials cleared");
        removed
    }

    fn with_credentials<T>(&self, f: impl FnOnce(Option<&Credentials>) -> T) -> T {
        let mut slot = self.lock();
        if matches!(*slot, Slot::Unloaded) {
            *slot = Slot::Loaded(self.load());
        }
        match &*slot {
            Slot::Loaded(credentials) => f(credentials.as_ref()),
            Slot::Unloaded => f(None),
        }
    }

    fn load(&self) -> Option<Credentials> {
        let sealed = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored credentials");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read credentials file");
                return None;
            }
        };

        let Some(plaintext) = self.secure.decrypt(&sealed) else {
            warn!(path = %self.path.display(), "Stored credentials could not be decrypted; treating as logged out");
            return None;
        };

        match serde_json::from_str(&plaintext) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Stored credentials are malformed; treating as logged out");
                None
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Write file atomically (temp file + rename).
fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    // Create temp file in same directory (required for atomic rename)
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("credentials"),
        std::process::id()
    ));

    {
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    std::fs::rename(&temp_path, path)?;
    Ok(())
}
