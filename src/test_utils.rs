//! Test utilities for finsync.
//!
//! Provides model factories, wire-format fixtures, an isolated SDK harness
//! and assertion macros for use across all test modules.
//!
//! # Usage
//!
//! ```rust,ignore
//! use finsync::test_utils::*;
//!
//! let harness = TestSdk::new(&server.uri());
//! harness.seed_credentials("A1", "R1", 3600);
//! let report = harness.sdk.providers().refresh_all().await;
//! ```

use std::fs;
use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use serde_json::{Value, json};

use crate::core::Finsync;
use crate::models::{
    Account, AccountStatus, AccountType, Balance, Message, MessageContent, Provider,
    ProviderAccount, ProviderStatus, RefreshStatus, RefreshStatusInfo, TextContent, Transaction,
    TransactionBaseType, TransactionStatus,
};
use crate::storage::{
    AesGcmCipher, AppPaths, Config, ConfigOverrides, MemoryRecordStore, RecordStore,
    ResolvedConfig, SecureStorage, SqliteRecordStore,
};

// =============================================================================
// Model Factories
// =============================================================================

/// Create a test `Provider`.
#[must_use]
pub fn make_test_provider(id: i64, name: &str) -> Provider {
    Provider {
        id,
        name: name.to_string(),
        status: ProviderStatus::Supported,
        popular: id % 2 == 0,
        small_logo_url: Some(format!("https://cdn.example/providers/{id}/small.png")),
        large_logo_url: None,
        base_url: Some(format!("https://bank{id}.example")),
        login_url: None,
        forgot_password_url: None,
        aggregator_provider_id: Some(10_000 + id),
    }
}

/// Create a test `ProviderAccount` under `provider_id`.
#[must_use]
pub fn make_test_provider_account(id: i64, provider_id: i64) -> ProviderAccount {
    ProviderAccount {
        id,
        provider_id,
        editable: true,
        refresh_status: Some(RefreshStatusInfo {
            status: RefreshStatus::Success,
            last_refreshed: Some(Utc::now() - TimeDelta::hours(1)),
            next_refresh: None,
        }),
    }
}

/// Create a test `Account` under `provider_account_id`.
#[must_use]
pub fn make_test_account(id: i64, provider_account_id: i64, name: &str) -> Account {
    Account {
        id,
        provider_account_id,
        account_name: name.to_string(),
        account_number: Some(format!("****{:04}", id % 10_000)),
        account_status: AccountStatus::Active,
        account_type: AccountType::Bank,
        nickname: None,
        favourite: false,
        hidden: false,
        current_balance: Some(Balance {
            amount: "1520.35".to_string(),
            currency: "AUD".to_string(),
        }),
        available_balance: None,
    }
}

/// Create a posted debit `Transaction` under `account_id`.
#[must_use]
pub fn make_test_transaction(id: i64, account_id: i64, amount: &str) -> Transaction {
    Transaction {
        id,
        account_id,
        amount: Balance {
            amount: amount.to_string(),
            currency: "AUD".to_string(),
        },
        base_type: TransactionBaseType::Debit,
        status: TransactionStatus::Posted,
        description: Some(format!("Card purchase {id}")),
        merchant: Some("Corner Store".to_string()),
        category_id: Some(77),
        included: true,
        post_date: chrono::NaiveDate::from_ymd_opt(2026, 2, 14),
        transaction_date: chrono::NaiveDate::from_ymd_opt(2026, 2, 13),
    }
}

/// Create a plain-text `Message`.
#[must_use]
pub fn make_test_message(id: i64, body: &str) -> Message {
    Message {
        id,
        event: Some("TEST_EVENT".to_string()),
        header: None,
        title: Some(format!("Message {id}")),
        content: MessageContent::Text(TextContent {
            body: body.to_string(),
        }),
        action: None,
        read: false,
        important: false,
        interactive: false,
        persistent: false,
        placement: None,
        created_date: None,
    }
}

// =============================================================================
// Wire Fixtures
// =============================================================================

/// Token endpoint success body expiring `expires_in` seconds from now.
#[must_use]
pub fn token_grant_json(access: &str, refresh: &str, expires_in: i64) -> Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "access_token_exp": Utc::now().timestamp() + expires_in,
    })
}

/// Structured error body as sent by the backend.
#[must_use]
pub fn api_error_json(error_code: &str, message: &str) -> Value {
    json!({ "error": { "error_code": error_code, "message": message } })
}

// =============================================================================
// SDK Harness
// =============================================================================

/// Fixed-key cipher, so tests never touch the platform keyring.
#[must_use]
pub fn test_cipher() -> Arc<dyn SecureStorage> {
    Arc::new(AesGcmCipher::new(&[7_u8; 32]))
}

/// Resolved configuration rooted in `root`, pointed at `base_url`.
///
/// `tweak` may adjust the file-level config before resolution.
///
/// # Panics
///
/// Panics if the resulting configuration is invalid.
#[must_use]
pub fn make_test_config(root: &Path, base_url: &str, tweak: impl FnOnce(&mut Config)) -> ResolvedConfig {
    let mut config = Config::default();
    config.api.base_url = Some(base_url.to_string());
    tweak(&mut config);
    ResolvedConfig::from_config(
        &config,
        &ConfigOverrides::default(),
        &|_: &str| None,
        &AppPaths::rooted(root),
    )
    .expect("test config should resolve")
}

/// Which record store a [`TestSdk`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStore {
    Sqlite,
    Memory,
}

/// An SDK instance with its own temporary directory and a fixed cipher.
pub struct TestSdk {
    pub dir: TestDir,
    pub config: ResolvedConfig,
    pub sdk: Finsync,
}

impl TestSdk {
    /// SQLite-backed SDK against `base_url` with default settings.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self::with(base_url, TestStore::Sqlite, |_| {})
    }

    /// SDK against `base_url` with the given store and config tweaks.
    ///
    /// # Panics
    ///
    /// Panics if the SDK cannot be built.
    #[must_use]
    pub fn with(base_url: &str, store: TestStore, tweak: impl FnOnce(&mut Config)) -> Self {
        let dir = TestDir::new();
        let config = make_test_config(dir.path(), base_url, tweak);
        let store: Arc<dyn RecordStore> = match store {
            TestStore::Sqlite => Arc::new(
                SqliteRecordStore::open(&config.database_path).expect("open test database"),
            ),
            TestStore::Memory => Arc::new(MemoryRecordStore::new()),
        };
        let sdk = Finsync::builder(config.clone())
            .secure_storage(test_cipher())
            .record_store(store)
            .build()
            .expect("build test SDK");
        Self { dir, config, sdk }
    }

    /// Store a token pair expiring `expires_in` seconds from now.
    ///
    /// # Panics
    ///
    /// Panics if the credentials cannot be written.
    pub fn seed_credentials(&self, access: &str, refresh: &str, expires_in: i64) {
        self.sdk
            .tokens()
            .save(access, refresh, Utc::now() + TimeDelta::seconds(expires_in))
            .expect("seed credentials");
    }
}

// =============================================================================
// Temporary Directories
// =============================================================================

/// An isolated temporary directory, removed on drop.
///
/// ```rust,ignore
/// use finsync::test_utils::TestDir;
///
/// let dir = TestDir::new();
/// dir.create_file("config/config.toml", "[api]\ntimeout_seconds = 5");
/// assert!(dir.file_exists("config/config.toml"));
/// ```
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// Create a new isolated temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file with the given content, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be created or written.
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        let mut file = fs::File::create(&path).expect("Failed to create test file");
        file.write_all(content.as_bytes())
            .expect("Failed to write test file");
    }

    /// Read a file from the temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.inner.path().join(name))
    }

    #[must_use]
    pub fn file_exists(&self, name: &str) -> bool {
        self.inner.path().join(name).exists()
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Assertion Macros
// =============================================================================

/// Assert that a string contains a substring.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            "Expected string to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert that a string does NOT contain a substring.
#[macro_export]
macro_rules! assert_not_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            !haystack.contains(needle),
            "Expected string NOT to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert that a string is valid JSON equal to the expected value.
#[macro_export]
macro_rules! assert_json_eq {
    ($json:expr, $expected:expr) => {
        let json = $json;
        let parsed: serde_json::Value = serde_json::from_str(json).expect("Invalid JSON");
        let expected: serde_json::Value = $expected;
        assert_eq!(
            parsed,
            expected,
            "JSON mismatch\n\nExpected:\n{}\n\nActual:\n{}",
            serde_json::to_string_pretty(&expected).unwrap(),
            serde_json::to_string_pretty(&parsed).unwrap()
        );
    };
}
