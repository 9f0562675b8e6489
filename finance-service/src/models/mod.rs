//! Domain models for finance-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

/// An authenticated end user. The primary key is the opaque subject
/// identifier issued by the identity provider.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub plaid_access_token: Option<String>,
    pub plaid_item_id: Option<String>,
    /// Opaque aggregator cursor. None means no transaction sync has run yet.
    pub plaid_transactions_cursor: Option<String>,
    /// Distinct first-of-month dates with at least one transaction,
    /// most recent first.
    pub transaction_months: Vec<NaiveDate>,
}

/// A financial account mirrored from the aggregator. `plaid_account_id` is
/// the reconciliation join key; the local `account_id` never changes once
/// the row exists.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub account_id: i64,
    pub plaid_account_id: String,
    pub account_type: String,
    pub account_name: String,
    pub official_name: String,
    pub plaid_mask: String,
    pub current_balance: Decimal,
    pub user_id: String,
}

/// A transaction mirrored from the aggregator. Positive amounts are
/// expenses under the aggregator's sign convention.
#[derive(Debug, Clone, FromRow)]
pub struct Transaction {
    pub transaction_id: i64,
    pub plaid_transaction_id: Option<String>,
    pub amount: Decimal,
    pub transaction_date: NaiveDate,
    pub merchant_name: String,
    pub description: Option<String>,
    pub is_pending: Option<bool>,
    pub plaid_category_primary: Option<String>,
    pub plaid_category_detailed: Option<String>,
    pub plaid_category_confidence_level: Option<String>,
    pub account_id: i64,
    pub category_id: Option<i64>,
}

/// Locally defined category labels. Reserved schema: no sync path populates
/// this table yet; transactions carry the aggregator's category fields
/// directly.
#[derive(Debug, Clone, FromRow)]
pub struct Category {
    pub category_id: i64,
    pub name: String,
}
