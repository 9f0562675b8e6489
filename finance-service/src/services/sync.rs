//! Account and transaction reconciliation against the aggregator.
//!
//! Each pass runs inside one explicit database transaction: the row
//! changes, the months index and the cursor commit together or not at all,
//! so the cursor never advances past changes that were not applied.

use crate::models::{Account, User};
use crate::services::database::{Database, USER_COLUMNS};
use crate::services::metrics::record_sync_operation;
use crate::services::plaid::{
    AccountsGetResponse, PlaidApi, PlaidTransaction, TransactionsSyncResponse,
};
use chrono::{Datelike, NaiveDate, Utc};
use service_core::error::AppError;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

/// Stored when the aggregator supplies neither a merchant name nor a
/// counterparty; downstream display and the LLM context rely on it.
pub const FALLBACK_MERCHANT_NAME: &str = "no name?";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("User not found")]
    NotFound,

    #[error("User has no linked aggregator item")]
    NotLinked,

    #[error("Invalid aggregator payload")]
    InvalidPayload,

    #[error("Aggregator request failed: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::NotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            SyncError::NotLinked => {
                AppError::BadRequest(anyhow::anyhow!("User has no linked aggregator item"))
            }
            SyncError::InvalidPayload => {
                AppError::BadRequest(anyhow::anyhow!("Invalid aggregator payload"))
            }
            SyncError::Upstream(msg) => AppError::BadGateway(msg),
            SyncError::Database(e) => {
                AppError::DatabaseError(anyhow::anyhow!("Sync failed: {}", e))
            }
        }
    }
}

/// Row counts of one reconciliation pass, for logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

pub struct SyncService {
    db: Arc<Database>,
    plaid: Arc<dyn PlaidApi>,
}

impl SyncService {
    pub fn new(db: Arc<Database>, plaid: Arc<dyn PlaidApi>) -> Self {
        Self { db, plaid }
    }

    /// Full sync: fresh account snapshot, then the incremental transaction
    /// delta from the stored cursor.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn sync_all(&self, user_id: &str) -> Result<(), SyncError> {
        let accounts = self.fetch_accounts(user_id).await?;
        self.sync_accounts(user_id, Some(accounts)).await?;

        let delta = self.fetch_transactions(user_id).await?;
        self.sync_transactions(user_id, Some(delta)).await?;

        Ok(())
    }

    async fn load_user(&self, user_id: &str) -> Result<User, SyncError> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or(SyncError::NotFound)
    }

    /// Fetch the current account snapshot from the aggregator.
    pub async fn fetch_accounts(&self, user_id: &str) -> Result<AccountsGetResponse, SyncError> {
        let user = self.load_user(user_id).await?;
        let access_token = user.plaid_access_token.ok_or(SyncError::NotLinked)?;

        self.plaid
            .accounts_get(&access_token)
            .await
            .map_err(|e| SyncError::Upstream(e.to_string()))
    }

    /// Fetch the transaction delta since the user's stored cursor.
    pub async fn fetch_transactions(
        &self,
        user_id: &str,
    ) -> Result<TransactionsSyncResponse, SyncError> {
        let user = self.load_user(user_id).await?;
        let access_token = user.plaid_access_token.ok_or(SyncError::NotLinked)?;

        self.plaid
            .transactions_sync(&access_token, user.plaid_transactions_cursor.as_deref())
            .await
            .map_err(|e| SyncError::Upstream(e.to_string()))
    }

    /// Reconcile local accounts against a fresh snapshot: update rows that
    /// still exist remotely (identity preserved), insert new ones, hard
    /// delete the rest, and stamp the user's last sync time.
    #[instrument(skip(self, payload), fields(user_id = %user_id))]
    pub async fn sync_accounts(
        &self,
        user_id: &str,
        payload: Option<AccountsGetResponse>,
    ) -> Result<SyncSummary, SyncError> {
        let Some(payload) = payload else {
            record_sync_operation("accounts", "invalid_payload");
            return Err(SyncError::InvalidPayload);
        };

        let mut tx = self.db.pool().begin().await?;

        let user_exists: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM users WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if user_exists.is_none() {
            return Err(SyncError::NotFound);
        }

        let remote_ids: HashSet<&str> = payload
            .accounts
            .iter()
            .map(|a| a.account_id.as_str())
            .collect();

        let local_accounts = sqlx::query_as::<_, Account>(
            "SELECT account_id, plaid_account_id, account_type, account_name, official_name, \
             plaid_mask, current_balance, user_id FROM accounts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        let local_by_plaid_id: HashMap<&str, i64> = local_accounts
            .iter()
            .map(|a| (a.plaid_account_id.as_str(), a.account_id))
            .collect();

        let mut summary = SyncSummary::default();

        for remote in &payload.accounts {
            let balance = remote.balances.current.unwrap_or_default();
            let official_name = remote.official_name.clone().unwrap_or_default();
            let mask = remote.mask.clone().unwrap_or_default();

            if let Some(&account_id) = local_by_plaid_id.get(remote.account_id.as_str()) {
                sqlx::query(
                    r#"
                    UPDATE accounts
                    SET current_balance = $2,
                        account_name = $3,
                        official_name = $4,
                        account_type = $5,
                        plaid_mask = $6
                    WHERE account_id = $1
                    "#,
                )
                .bind(account_id)
                .bind(balance)
                .bind(&remote.name)
                .bind(&official_name)
                .bind(&remote.account_type)
                .bind(&mask)
                .execute(&mut *tx)
                .await?;
                summary.updated += 1;
            } else {
                sqlx::query(
                    r#"
                    INSERT INTO accounts
                        (plaid_account_id, user_id, current_balance, account_name,
                         official_name, account_type, plaid_mask)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(&remote.account_id)
                .bind(user_id)
                .bind(balance)
                .bind(&remote.name)
                .bind(&official_name)
                .bind(&remote.account_type)
                .bind(&mask)
                .execute(&mut *tx)
                .await?;
                summary.added += 1;
            }
        }

        let stale_ids: Vec<i64> = local_accounts
            .iter()
            .filter(|a| !remote_ids.contains(a.plaid_account_id.as_str()))
            .map(|a| a.account_id)
            .collect();

        if !stale_ids.is_empty() {
            sqlx::query("DELETE FROM accounts WHERE account_id = ANY($1)")
                .bind(&stale_ids)
                .execute(&mut *tx)
                .await?;
        }
        summary.removed = stale_ids.len();

        // UTC wall clock: timestamps must not drift with deployment timezone.
        sqlx::query("UPDATE users SET last_sync_time = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        record_sync_operation("accounts", "success");
        info!(
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            "Account sync complete"
        );

        Ok(summary)
    }

    /// Apply an incremental transaction delta, then recompute the user's
    /// distinct-months index and store the new cursor, all in one unit.
    #[instrument(skip(self, payload), fields(user_id = %user_id))]
    pub async fn sync_transactions(
        &self,
        user_id: &str,
        payload: Option<TransactionsSyncResponse>,
    ) -> Result<SyncSummary, SyncError> {
        let Some(payload) = payload else {
            record_sync_operation("transactions", "invalid_payload");
            return Err(SyncError::InvalidPayload);
        };

        let mut tx = self.db.pool().begin().await?;

        let user_exists: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM users WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if user_exists.is_none() {
            return Err(SyncError::NotFound);
        }

        let account_ids: HashMap<String, i64> = sqlx::query_as::<_, (String, i64)>(
            "SELECT plaid_account_id, account_id FROM accounts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        let mut summary = SyncSummary::default();

        for added in &payload.added {
            // Skip transactions whose account has not been reconciled yet.
            let Some(&account_id) = account_ids.get(&added.account_id) else {
                continue;
            };

            let category = added.personal_finance_category.clone().unwrap_or_default();
            sqlx::query(
                r#"
                INSERT INTO transactions
                    (plaid_transaction_id, account_id, amount, transaction_date,
                     description, merchant_name, is_pending, plaid_category_primary,
                     plaid_category_detailed, plaid_category_confidence_level, category_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NULL)
                "#,
            )
            .bind(&added.transaction_id)
            .bind(account_id)
            .bind(added.amount.unwrap_or_default())
            .bind(added.date.unwrap_or_default())
            .bind(&added.name)
            .bind(resolve_merchant_name(added))
            .bind(added.pending)
            .bind(&category.primary)
            .bind(&category.detailed)
            .bind(&category.confidence_level)
            .execute(&mut *tx)
            .await?;
            summary.added += 1;
        }

        for modified in &payload.modified {
            let Some(&account_id) = account_ids.get(&modified.account_id) else {
                continue;
            };

            // Overwrite in place; a modification for an unknown transaction
            // is dropped, never turned into an insert.
            let category = modified
                .personal_finance_category
                .clone()
                .unwrap_or_default();
            let result = sqlx::query(
                r#"
                UPDATE transactions
                SET account_id = $2,
                    amount = $3,
                    transaction_date = $4,
                    description = $5,
                    merchant_name = $6,
                    is_pending = $7,
                    plaid_category_primary = $8,
                    plaid_category_detailed = $9,
                    plaid_category_confidence_level = $10,
                    category_id = NULL
                WHERE plaid_transaction_id = $1
                "#,
            )
            .bind(&modified.transaction_id)
            .bind(account_id)
            .bind(modified.amount.unwrap_or_default())
            .bind(modified.date.unwrap_or_default())
            .bind(&modified.name)
            .bind(resolve_merchant_name(modified))
            .bind(modified.pending)
            .bind(&category.primary)
            .bind(&category.detailed)
            .bind(&category.confidence_level)
            .execute(&mut *tx)
            .await?;
            summary.updated += result.rows_affected() as usize;
        }

        for removed in &payload.removed {
            let result = sqlx::query("DELETE FROM transactions WHERE plaid_transaction_id = $1")
                .bind(&removed.transaction_id)
                .execute(&mut *tx)
                .await?;
            summary.removed += result.rows_affected() as usize;
        }

        let dates: Vec<NaiveDate> = sqlx::query_scalar(
            r#"
            SELECT t.transaction_date
            FROM transactions t
            JOIN accounts a ON a.account_id = t.account_id
            WHERE a.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        let months = distinct_months(&dates);

        // The cursor only moves once everything above is committed with it.
        sqlx::query(
            "UPDATE users SET plaid_transactions_cursor = $2, transaction_months = $3 \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(&payload.next_cursor)
        .bind(&months)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        record_sync_operation("transactions", "success");
        info!(
            added = summary.added,
            modified = summary.updated,
            removed = summary.removed,
            months = months.len(),
            "Transaction sync complete"
        );

        Ok(summary)
    }
}

/// Merchant-name fallback chain: merchant name, then the first counterparty,
/// then a fixed placeholder.
pub(crate) fn resolve_merchant_name(tx: &PlaidTransaction) -> String {
    tx.merchant_name
        .clone()
        .or_else(|| tx.counterparties.first().and_then(|c| c.name.clone()))
        .unwrap_or_else(|| FALLBACK_MERCHANT_NAME.to_string())
}

/// Normalize dates to their first-of-month, dedupe, and sort most recent
/// first.
pub(crate) fn distinct_months(dates: &[NaiveDate]) -> Vec<NaiveDate> {
    dates
        .iter()
        .filter_map(|d| NaiveDate::from_ymd_opt(d.year(), d.month(), 1))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .rev()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::plaid::Counterparty;

    fn plaid_tx(merchant_name: Option<&str>, counterparty: Option<&str>) -> PlaidTransaction {
        PlaidTransaction {
            transaction_id: "t1".to_string(),
            account_id: "a1".to_string(),
            amount: None,
            date: None,
            name: None,
            merchant_name: merchant_name.map(str::to_string),
            counterparties: counterparty
                .map(|name| {
                    vec![Counterparty {
                        name: Some(name.to_string()),
                    }]
                })
                .unwrap_or_default(),
            pending: None,
            personal_finance_category: None,
        }
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn merchant_name_prefers_explicit_name() {
        let tx = plaid_tx(Some("Cafe"), Some("Coffee Counterparty"));
        assert_eq!(resolve_merchant_name(&tx), "Cafe");
    }

    #[test]
    fn merchant_name_falls_back_to_first_counterparty() {
        let tx = plaid_tx(None, Some("Coffee Counterparty"));
        assert_eq!(resolve_merchant_name(&tx), "Coffee Counterparty");
    }

    #[test]
    fn merchant_name_falls_back_to_placeholder() {
        let tx = plaid_tx(None, None);
        assert_eq!(resolve_merchant_name(&tx), FALLBACK_MERCHANT_NAME);
    }

    #[test]
    fn distinct_months_dedupes_and_sorts_descending() {
        let dates = vec![
            date(2024, 1, 15),
            date(2024, 3, 5),
            date(2024, 3, 28),
            date(2023, 12, 31),
            date(2024, 1, 1),
        ];

        assert_eq!(
            distinct_months(&dates),
            vec![date(2024, 3, 1), date(2024, 1, 1), date(2023, 12, 1)]
        );
    }

    #[test]
    fn distinct_months_orders_by_year_then_month() {
        // A later month of an earlier year must not beat an earlier month
        // of a later year.
        let dates = vec![date(2023, 12, 1), date(2024, 1, 1)];
        assert_eq!(
            distinct_months(&dates),
            vec![date(2024, 1, 1), date(2023, 12, 1)]
        );
    }

    #[test]
    fn distinct_months_handles_empty_and_single_histories() {
        assert!(distinct_months(&[]).is_empty());
        assert_eq!(
            distinct_months(&[date(2024, 3, 5)]),
            vec![date(2024, 3, 1)]
        );
    }
}
