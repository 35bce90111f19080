//! Encryption at rest for stored credentials.
//!
//! [`SecureStorage`] is the seam the token store encrypts through. The default
//! [`AesGcmCipher`] uses AES-256-GCM with a random 96-bit nonce per message;
//! its key lives in the platform keyring, never on disk next to the data.
//!
//! Ciphertext format: `base64(nonce || ciphertext+tag)`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};

use crate::error::{FinsyncError, Result};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const KEYRING_ACCOUNT: &str = "token-encryption-key";

/// Symmetric encryption of short strings.
///
/// Failures are reported as `None`; callers treat undecryptable data as absent.
pub trait SecureStorage: Send + Sync {
    /// Encrypt `plaintext` into an opaque printable string.
    fn encrypt(&self, plaintext: &str) -> Option<String>;

    /// Reverse [`SecureStorage::encrypt`]. `None` for tampered, foreign, or malformed input.
    fn decrypt(&self, ciphertext: &str) -> Option<String>;
}

/// AES-256-GCM cipher.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
    fingerprint: String,
}

impl std::fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmCipher")
            .field("key", &"[REDACTED]")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl AesGcmCipher {
    /// Build a cipher from a raw 32-byte key.
    #[must_use]
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key);
        let fingerprint = hex::encode(&hasher.finalize()[..8]);

        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
            fingerprint,
        }
    }

    /// Build a cipher with a fresh random key (not persisted).
    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut raw = [0_u8; KEY_LEN];
        raw.copy_from_slice(&key);
        Self::new(&raw)
    }

    /// Load the key from the platform keyring, creating and storing one on first use.
    ///
    /// # Errors
    ///
    /// Returns [`FinsyncError::SecureStorage`] if the keyring is unavailable.
    pub fn from_keyring(service: &str) -> Result<Self> {
        let source = KeyringKeySource::new(service)?;
        Self::from_key_source(&source)
    }

    /// Load the key from `source`, creating and storing one when it is missing.
    ///
    /// A malformed stored key is replaced. Credentials sealed with the old key
    /// then fail to decrypt and read as absent.
    ///
    /// # Errors
    ///
    /// Returns [`FinsyncError::SecureStorage`] if `source` cannot be read or written.
    pub fn from_key_source(source: &dyn KeySource) -> Result<Self> {
        if let Some(encoded) = source.load()? {
            match parse_key(&encoded) {
                Ok(key) => {
                    let cipher = Self::new(&key);
                    tracing::debug!(fingerprint = %cipher.fingerprint, "Loaded encryption key");
                    return Ok(cipher);
                }
                Err(reason) => {
                    tracing::warn!(%reason, "Stored encryption key is malformed; replacing it");
                }
            }
        }

        let key = Aes256Gcm::generate_key(OsRng);
        source.store(&hex::encode(key))?;
        let mut raw = [0_u8; KEY_LEN];
        raw.copy_from_slice(&key);
        let cipher = Self::new(&raw);
        tracing::info!(fingerprint = %cipher.fingerprint, "Created encryption key");
        Ok(cipher)
    }

    /// Short, non-reversible identifier for the key, safe to log.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn parse_key(encoded: &str) -> std::result::Result<[u8; KEY_LEN], String> {
    let bytes = hex::decode(encoded.trim()).map_err(|e| format!("not hex: {e}"))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| format!("{} bytes, expected {KEY_LEN}", bytes.len()))
}

// =============================================================================
// Key Sources
// =============================================================================

/// Where the hex-encoded encryption key is kept.
pub trait KeySource {
    /// The stored key, or `None` if none has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn load(&self) -> Result<Option<String>>;

    /// Replace the stored key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn store(&self, encoded: &str) -> Result<()>;
}

/// Key kept in the platform keyring under one service name.
pub struct KeyringKeySource {
    entry: keyring::Entry,
}

impl KeyringKeySource {
    /// # Errors
    ///
    /// Returns [`FinsyncError::SecureStorage`] if the keyring entry cannot be opened.
    pub fn new(service: &str) -> Result<Self> {
        let entry = keyring::Entry::new(service, KEYRING_ACCOUNT)
            .map_err(|e| FinsyncError::SecureStorage(format!("keyring error: {e}")))?;
        Ok(Self { entry })
    }
}

impl KeySource for KeyringKeySource {
    fn load(&self) -> Result<Option<String>> {
        match self.entry.get_password() {
            Ok(encoded) => Ok(Some(encoded)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(FinsyncError::SecureStorage(format!("failed to read key: {e}"))),
        }
    }

    fn store(&self, encoded: &str) -> Result<()> {
        self.entry
            .set_password(encoded)
            .map_err(|e| FinsyncError::SecureStorage(format!("failed to store key: {e}")))
    }
}

impl SecureStorage for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Option<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self.cipher.encrypt(&nonce, plaintext.as_bytes()).ok()?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Some(BASE64.encode(payload))
    }

    fn decrypt(&self, ciphertext: &str) -> Option<String> {
        let payload = BASE64.decode(ciphertext.trim()).ok()?;
        if payload.len() <= NONCE_LEN {
            return None;
        }
        let (nonce, body) = payload.split_at(NONCE_LEN);
        let plaintext = self.cipher.decrypt(Nonce::from_slice(nonce), body).ok()?;
        String::from_utf8(plaintext).ok()
    }
}
