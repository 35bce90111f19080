//! Domain models surfaced to the host and cached locally.
//!
//! Every cached family implements [`Resource`], which ties a model type to its
//! [`ResourceKind`] descriptor (endpoint path, cache table, parent key).

pub mod account;
pub mod message;
pub mod provider;
pub mod transaction;
pub mod wire;

use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{FinsyncError, Result};

pub use account::{Account, AccountStatus, AccountType, Balance};
pub use message::{
    HtmlContent, ImageContent, Message, MessageAction, MessageContent, MessageContentType,
    TextContent, VideoContent,
};
pub use provider::{Provider, ProviderAccount, ProviderStatus, RefreshStatus, RefreshStatusInfo};
pub use transaction::{Transaction, TransactionBaseType, TransactionStatus};

// =============================================================================
// Resource Kind
// =============================================================================

/// Resource families synchronised by the SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Provider,
    ProviderAccount,
    Account,
    Transaction,
    Message,
}

impl ResourceKind {
    /// All families, parents before children.
    pub const ALL: &'static [Self] = &[
        Self::Provider,
        Self::ProviderAccount,
        Self::Account,
        Self::Transaction,
        Self::Message,
    ];

    /// CLI name for this family.
    #[must_use]
    pub const fn cli_name(self) -> &'static str {
        match self {
            Self::Provider => "providers",
            Self::ProviderAccount => "provider-accounts",
            Self::Account => "accounts",
            Self::Transaction => "transactions",
            Self::Message => "messages",
        }
    }

    /// Parse from CLI argument.
    ///
    /// # Errors
    ///
    /// Returns [`FinsyncError::UnknownResource`] for unrecognised names.
    pub fn from_cli_name(name: &str) -> Result<Self> {
        let lower = name.to_lowercase();
        Self::ALL
            .iter()
            .find(|k| k.cli_name() == lower)
            .copied()
            .ok_or_else(|| FinsyncError::UnknownResource(name.to_string()))
    }

    /// Collection endpoint, relative to the API base URL.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Provider => "aggregation/providers",
            Self::ProviderAccount => "aggregation/provideraccounts",
            Self::Account => "aggregation/accounts",
            Self::Transaction => "aggregation/transactions",
            Self::Message => "messages",
        }
    }

    /// Local cache table.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Provider => "providers",
            Self::ProviderAccount => "provider_accounts",
            Self::Account => "accounts",
            Self::Transaction => "transactions",
            Self::Message => "messages",
        }
    }

    /// Query parameter used to scope a listing to one parent, if the family has a parent.
    #[must_use]
    pub const fn parent_param(self) -> Option<&'static str> {
        match self {
            Self::ProviderAccount => Some("provider_id"),
            Self::Account => Some("provider_account_id"),
            Self::Transaction => Some("account_id"),
            Self::Provider | Self::Message => None,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.cli_name())
    }
}

// =============================================================================
// Resource Trait
// =============================================================================

/// A model cached by server-assigned integer id.
pub trait Resource: Serialize + DeserializeOwned + Clone + PartialEq + Debug + Send + Sync + 'static {
    /// Family descriptor.
    const KIND: ResourceKind;

    /// Server-assigned primary key.
    fn id(&self) -> i64;

    /// Id of the owning record in the parent family, if any.
    fn parent_id(&self) -> Option<i64> {
        None
    }
}
