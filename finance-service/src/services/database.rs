//! Database service for finance-service.

use crate::models::{Account, Transaction, User};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

pub(crate) const USER_COLUMNS: &str = "user_id, email, full_name, date_of_birth, \
     last_sync_time, plaid_access_token, plaid_item_id, plaid_transactions_cursor, \
     transaction_months";

pub(crate) const ACCOUNT_COLUMNS: &str = "account_id, plaid_account_id, account_type, \
     account_name, official_name, plaid_mask, current_balance, user_id";

pub(crate) const TRANSACTION_COLUMNS: &str = "transaction_id, plaid_transaction_id, amount, \
     transaction_date, merchant_name, description, is_pending, plaid_category_primary, \
     plaid_category_detailed, plaid_category_confidence_level, account_id, category_id";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "finance-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // User Operations
    // =========================================================================

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get user: {}", e)))?;

        timer.observe_duration();

        Ok(user)
    }

    /// First user in the store, used only by the diagnostic routes.
    #[instrument(skip(self))]
    pub async fn first_user(&self) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["first_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY user_id LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get first user: {}", e)))?;

        timer.observe_duration();

        Ok(user)
    }

    /// Create the user on first verification, refresh identity fields on
    /// every later one.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn upsert_user_identity(
        &self,
        user_id: &str,
        email: &str,
        full_name: &str,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_user_identity"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, full_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id)
            DO UPDATE SET email = EXCLUDED.email, full_name = EXCLUDED.full_name
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(full_name)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to upsert user: {}", e)))?;

        timer.observe_duration();

        Ok(())
    }

    /// Store the aggregator credentials and reset the sync cursor.
    /// Returns false when the user does not exist.
    #[instrument(skip(self, access_token), fields(user_id = %user_id))]
    pub async fn set_plaid_credentials(
        &self,
        user_id: &str,
        access_token: &str,
        item_id: &str,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_plaid_credentials"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE users
            SET plaid_access_token = $2,
                plaid_item_id = $3,
                plaid_transactions_cursor = NULL
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(access_token)
        .bind(item_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to store credentials: {}", e))
        })?;

        timer.observe_duration();
        info!(user_id = %user_id, "Aggregator credentials stored, cursor cleared");

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Account Operations
    // =========================================================================

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn accounts_for_user(&self, user_id: &str) -> Result<Vec<Account>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["accounts_for_user"])
            .start_timer();

        let accounts = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list accounts: {}", e)))?;

        timer.observe_duration();

        Ok(accounts)
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    /// All of a user's transactions, optionally restricted to
    /// `[start, end_exclusive)`.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn transactions_for_user(
        &self,
        user_id: &str,
        window: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<Vec<Transaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transactions_for_user"])
            .start_timer();

        let transactions = if let Some((start, end_exclusive)) = window {
            sqlx::query_as::<_, Transaction>(&format!(
                r#"
                SELECT {TRANSACTION_COLUMNS}
                FROM transactions
                WHERE account_id IN (SELECT account_id FROM accounts WHERE user_id = $1)
                  AND transaction_date >= $2
                  AND transaction_date < $3
                "#
            ))
            .bind(user_id)
            .bind(start)
            .bind(end_exclusive)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Transaction>(&format!(
                r#"
                SELECT {TRANSACTION_COLUMNS}
                FROM transactions
                WHERE account_id IN (SELECT account_id FROM accounts WHERE user_id = $1)
                "#
            ))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list transactions: {}", e))
        })?;

        timer.observe_duration();

        Ok(transactions)
    }

    /// (primary category, amount) pairs for a user inside `[start, end]`
    /// inclusive. Aggregation itself happens in-process.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn spending_rows(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(Option<String>, Decimal)>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["spending_rows"])
            .start_timer();

        let rows = sqlx::query_as::<_, (Option<String>, Decimal)>(
            r#"
            SELECT t.plaid_category_primary, t.amount
            FROM transactions t
            JOIN accounts a ON a.account_id = t.account_id
            WHERE a.user_id = $1
              AND t.transaction_date >= $2
              AND t.transaction_date <= $3
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load spending rows: {}", e))
        })?;

        timer.observe_duration();

        Ok(rows)
    }
}
