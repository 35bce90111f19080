//! Storage for configuration, credentials, and the record cache.

pub mod cache;
pub mod config;
pub mod paths;
pub mod secure;
pub mod sqlite;
pub mod token_store;

pub use cache::{
    CacheChange, CachedRecord, MemoryRecordStore, Reconciled, RecordQuery, RecordStore, Scope,
};
pub use config::{
    Config, ConfigOverrides, ConfigSource, ConfigSources, ENV_BASE_URL, ENV_CONFIG, ENV_TIMEOUT,
    ENV_TOKEN_URL, ResolvedConfig,
};
pub use paths::AppPaths;
pub use secure::{AesGcmCipher, KeySource, KeyringKeySource, SecureStorage};
pub use sqlite::SqliteRecordStore;
pub use token_store::{Credentials, TokenStore};
