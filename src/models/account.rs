//! Accounts held at a provider.

use serde::{Deserialize, Serialize};

use super::{Resource, ResourceKind};

crate::wire_enum! {
    /// Lifecycle of an account.
    pub enum AccountStatus {
        Active => "active",
        Inactive => "inactive",
        Closed => "closed",
    }
}

crate::wire_enum! {
    /// Product type of an account.
    pub enum AccountType {
        Bank => "bank",
        Savings => "savings",
        CreditCard => "credit_card",
        SuperAnnuation => "super_annuation",
        Investment => "investment",
        Loan => "loan",
        Mortgage => "mortgage",
        Other => "other",
    }
}

/// A monetary amount. Amounts stay decimal strings so no precision is lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub amount: String,
    pub currency: String,
}

/// One account at a provider, owned by a provider account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub provider_account_id: i64,
    pub account_name: String,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub account_status: AccountStatus,
    #[serde(default)]
    pub account_type: AccountType,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub favourite: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub current_balance: Option<Balance>,
    #[serde(default)]
    pub available_balance: Option<Balance>,
}

impl Account {
    /// Name to show the user: nickname when set, otherwise the account name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.nickname
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.account_name)
    }
}

impl Resource for Account {
    const KIND: ResourceKind = ResourceKind::Account;

    fn id(&self) -> i64 {
        self.id
    }

    fn parent_id(&self) -> Option<i64> {
        Some(self.provider_account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_balances_and_enums() {
        let json = r#"{
            "id": 345,
            "provider_account_id": 12,
            "account_name": "Everyday",
            "account_status": "active",
            "account_type": "credit_card",
            "current_balance": {"amount": "-42.10", "currency": "AUD"}
        }"#;
        let account: Account = serde_json::from_str(json).unwrap();
        assert_eq!(account.account_type, AccountType::CreditCard);
        assert_eq!(account.account_status, AccountStatus::Active);
        assert_eq!(account.current_balance.as_ref().unwrap().amount, "-42.10");
        assert_eq!(account.parent_id(), Some(12));
    }

    #[test]
    fn display_name_prefers_nickname() {
        let json = r#"{"id": 1, "provider_account_id": 2, "account_name": "Everyday", "nickname": ""}"#;
        let mut account: Account = serde_json::from_str(json).unwrap();
        assert_eq!(account.display_name(), "Everyday");
        account.nickname = Some("Bills".into());
        assert_eq!(account.display_name(), "Bills");
    }
}
