//! Request and response shapes for the HTTP surface.
//!
//! Response field names are camelCase to stay wire-compatible with the
//! previous deployment of this API; the LLM context shapes keep their
//! lowercase names because the advice endpoint consumes them verbatim.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Account, Transaction};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDto {
    pub account_id: i64,
    pub account_type: String,
    pub account_name: String,
    pub current_balance: Decimal,
    pub plaid_mask: String,
}

impl From<Account> for AccountDto {
    fn from(a: Account) -> Self {
        Self {
            account_id: a.account_id,
            account_type: a.account_type,
            account_name: a.account_name,
            current_balance: a.current_balance,
            plaid_mask: a.plaid_mask,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsResponse {
    pub accounts: Vec<AccountDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
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
}

impl From<Transaction> for TransactionDto {
    fn from(t: Transaction) -> Self {
        Self {
            transaction_id: t.transaction_id,
            plaid_transaction_id: t.plaid_transaction_id,
            amount: t.amount,
            transaction_date: t.transaction_date,
            merchant_name: t.merchant_name,
            description: t.description,
            is_pending: t.is_pending,
            plaid_category_primary: t.plaid_category_primary,
            plaid_category_detailed: t.plaid_category_detailed,
            plaid_category_confidence_level: t.plaid_category_confidence_level,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsResponse {
    pub transaction_count: usize,
    pub transactions: Vec<TransactionDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub email: String,
    pub full_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Formatted as `MM/yyyy`, most recent first.
    pub transaction_months: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicTokenExchangeRequest {
    pub public_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicTokenExchangeResponse {
    pub public_token_exchange: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthRequest {
    /// Optional `MM/yyyy` filter; null returns the complete history.
    pub month_year: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmQueryRequest {
    pub query: Option<String>,
    /// 1-12; defaults to the current month.
    pub month: Option<u32>,
    /// Defaults to the current year.
    pub year: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmQueryResponse {
    pub response: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestLlmRequest {
    pub query: Option<String>,
    pub month: Option<u32>,
    pub year: Option<i32>,
}

/// One aggregated spending bucket, named by the aggregator's primary
/// category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySpending {
    pub category: String,
    pub amount: Decimal,
}

/// The spending summary serialized into the advice endpoint's data context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendingContext {
    /// English month name, e.g. "January".
    pub month: String,
    pub year: i32,
    pub spending: Vec<CategorySpending>,
}
