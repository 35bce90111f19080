//! Transactions posted to an account.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Balance, Resource, ResourceKind};

crate::wire_enum! {
    /// Settlement state of a transaction.
    pub enum TransactionStatus {
        Pending => "pending",
        Posted => "posted",
        Scheduled => "scheduled",
    }
}

crate::wire_enum! {
    /// Direction of money movement.
    pub enum TransactionBaseType {
        Credit => "credit",
        Debit => "debit",
        Other => "other",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub account_id: i64,
    pub amount: Balance,
    #[serde(default)]
    pub base_type: TransactionBaseType,
    #[serde(default)]
    pub status: TransactionStatus,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub included: bool,
    #[serde(default)]
    pub post_date: Option<NaiveDate>,
    #[serde(default)]
    pub transaction_date: Option<NaiveDate>,
}

impl Transaction {
    /// Date used for ordering: the transaction date, falling back to the post date.
    #[must_use]
    pub fn effective_date(&self) -> Option<NaiveDate> {
        self.transaction_date.or(self.post_date)
    }
}

impl Resource for Transaction {
    const KIND: ResourceKind = ResourceKind::Transaction;

    fn id(&self) -> i64 {
        self.id
    }

    fn parent_id(&self) -> Option<i64> {
        Some(self.account_id)
    }
}
