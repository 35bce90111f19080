//! Providers (financial institutions) and the user's connections to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Resource, ResourceKind};

crate::wire_enum! {
    /// Aggregation support level of a provider.
    pub enum ProviderStatus {
        Working => "working",
        Supported => "supported",
        Beta => "beta",
        Unsupported => "unsupported",
        Disabled => "disabled",
        Outdated => "outdated",
    }
}

crate::wire_enum! {
    /// State of the most recent aggregation run for a provider account.
    pub enum RefreshStatus {
        Success => "success",
        NeedsAction => "needs_action",
        Failed => "failed",
        Adding => "adding",
        Updating => "updating",
    }
}

/// A financial institution the backend can aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub status: ProviderStatus,
    #[serde(default)]
    pub popular: bool,
    #[serde(default)]
    pub small_logo_url: Option<String>,
    #[serde(default)]
    pub large_logo_url: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub login_url: Option<String>,
    #[serde(default)]
    pub forgot_password_url: Option<String>,
    #[serde(default)]
    pub aggregator_provider_id: Option<i64>,
}

impl Resource for Provider {
    const KIND: ResourceKind = ResourceKind::Provider;

    fn id(&self) -> i64 {
        self.id
    }
}

/// Outcome of the last aggregation for a provider account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshStatusInfo {
    #[serde(default)]
    pub status: RefreshStatus,
    #[serde(default)]
    pub last_refreshed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_refresh: Option<DateTime<Utc>>,
}

/// The user's login at one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAccount {
    pub id: i64,
    pub provider_id: i64,
    #[serde(default)]
    pub editable: bool,
    #[serde(default)]
    pub refresh_status: Option<RefreshStatusInfo>,
}

impl Resource for ProviderAccount {
    const KIND: ResourceKind = ResourceKind::ProviderAccount;

    fn id(&self) -> i64 {
        self.id
    }

    fn parent_id(&self) -> Option<i64> {
        Some(self.provider_id)
    }
}
