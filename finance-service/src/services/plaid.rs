//! Aggregator (Plaid) provider.
//!
//! Trait-based so the HTTP client can be swapped for a mock in tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Mutex;
use thiserror::Error;

/// Error type for aggregator calls.
#[derive(Debug, Error)]
pub enum PlaidError {
    #[error("Aggregator API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Aggregator client configuration.
#[derive(Debug, Clone)]
pub struct PlaidConfig {
    pub base_url: String,
    pub client_id: String,
    pub secret: String,
    pub client_name: String,
    pub products: Vec<String>,
    pub country_codes: Vec<String>,
    pub language: String,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountBalances {
    pub current: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaidAccount {
    pub account_id: String,
    pub name: String,
    pub official_name: Option<String>,
    pub mask: Option<String>,
    #[serde(rename = "type")]
    pub account_type: String,
    pub balances: AccountBalances,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountsGetResponse {
    pub accounts: Vec<PlaidAccount>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonalFinanceCategory {
    pub primary: Option<String>,
    pub detailed: Option<String>,
    pub confidence_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Counterparty {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaidTransaction {
    pub transaction_id: String,
    pub account_id: String,
    pub amount: Option<Decimal>,
    pub date: Option<NaiveDate>,
    /// The aggregator's descriptive name, stored as the local description.
    pub name: Option<String>,
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub counterparties: Vec<Counterparty>,
    pub pending: Option<bool>,
    pub personal_finance_category: Option<PersonalFinanceCategory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemovedTransaction {
    pub transaction_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionsSyncResponse {
    #[serde(default)]
    pub added: Vec<PlaidTransaction>,
    #[serde(default)]
    pub modified: Vec<PlaidTransaction>,
    #[serde(default)]
    pub removed: Vec<RemovedTransaction>,
    pub next_cursor: String,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicTokenExchangeResult {
    pub access_token: String,
    pub item_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkTokenCreateResponse {
    pub link_token: String,
}

/// Error body the aggregator returns on non-success statuses.
#[derive(Debug, Default, Deserialize)]
struct PlaidErrorBody {
    error_code: Option<String>,
    error_message: Option<String>,
}

// ============================================================================
// Provider trait
// ============================================================================

/// The aggregator operations this backend depends on.
#[async_trait]
pub trait PlaidApi: Send + Sync {
    /// Exchange a short-lived public token for a long-lived access token.
    async fn exchange_public_token(
        &self,
        public_token: &str,
    ) -> Result<PublicTokenExchangeResult, PlaidError>;

    /// Fetch the full current account snapshot for an item.
    async fn accounts_get(&self, access_token: &str) -> Result<AccountsGetResponse, PlaidError>;

    /// Fetch the incremental transaction delta since `cursor`.
    async fn transactions_sync(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<TransactionsSyncResponse, PlaidError>;

    /// Create a new link session token for the given user.
    async fn link_token_create(
        &self,
        client_user_id: &str,
    ) -> Result<LinkTokenCreateResponse, PlaidError>;
}

// ============================================================================
// HTTP client
// ============================================================================

pub struct PlaidClient {
    config: PlaidConfig,
    client: Client,
}

impl PlaidClient {
    pub fn new(config: PlaidConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, PlaidError> {
        let url = format!("{}{}", self.config.base_url, path);

        tracing::debug!(path = path, "Sending request to aggregator");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlaidError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let error: PlaidErrorBody = serde_json::from_str(&text).unwrap_or_default();

            return Err(PlaidError::Api(format!(
                "{} {}: {}",
                status,
                error.error_code.unwrap_or_default(),
                error.error_message.unwrap_or(text)
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PlaidError::Api(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl PlaidApi for PlaidClient {
    async fn exchange_public_token(
        &self,
        public_token: &str,
    ) -> Result<PublicTokenExchangeResult, PlaidError> {
        self.post(
            "/item/public_token/exchange",
            json!({
                "client_id": self.config.client_id,
                "secret": self.config.secret,
                "public_token": public_token,
            }),
        )
        .await
    }

    async fn accounts_get(&self, access_token: &str) -> Result<AccountsGetResponse, PlaidError> {
        self.post(
            "/accounts/get",
            json!({
                "client_id": self.config.client_id,
                "secret": self.config.secret,
                "access_token": access_token,
            }),
        )
        .await
    }

    async fn transactions_sync(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<TransactionsSyncResponse, PlaidError> {
        self.post(
            "/transactions/sync",
            json!({
                "client_id": self.config.client_id,
                "secret": self.config.secret,
                "access_token": access_token,
                "cursor": cursor,
            }),
        )
        .await
    }

    async fn link_token_create(
        &self,
        client_user_id: &str,
    ) -> Result<LinkTokenCreateResponse, PlaidError> {
        self.post(
            "/link/token/create",
            json!({
                "client_id": self.config.client_id,
                "secret": self.config.secret,
                "client_name": self.config.client_name,
                "language": self.config.language,
                "country_codes": self.config.country_codes,
                "products": self.config.products,
                "user": { "client_user_id": client_user_id },
            }),
        )
        .await
    }
}

// ============================================================================
// Mock provider
// ============================================================================

/// Mock aggregator for tests: returns whatever the test staged.
pub struct MockPlaidApi {
    exchange: Mutex<PublicTokenExchangeResult>,
    accounts: Mutex<AccountsGetResponse>,
    transactions: Mutex<TransactionsSyncResponse>,
    link_token: Mutex<String>,
}

impl Default for MockPlaidApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlaidApi {
    pub fn new() -> Self {
        Self {
            exchange: Mutex::new(PublicTokenExchangeResult {
                access_token: "access-sandbox-test".to_string(),
                item_id: "item-test".to_string(),
            }),
            accounts: Mutex::new(AccountsGetResponse::default()),
            transactions: Mutex::new(TransactionsSyncResponse {
                next_cursor: "cursor-0".to_string(),
                ..Default::default()
            }),
            link_token: Mutex::new("link-sandbox-test".to_string()),
        }
    }

    pub fn set_accounts(&self, accounts: Vec<PlaidAccount>) {
        *self.accounts.lock().expect("mock state poisoned") = AccountsGetResponse { accounts };
    }

    pub fn set_transactions(&self, response: TransactionsSyncResponse) {
        *self.transactions.lock().expect("mock state poisoned") = response;
    }

    pub fn set_link_token(&self, token: &str) {
        *self.link_token.lock().expect("mock state poisoned") = token.to_string();
    }
}

#[async_trait]
impl PlaidApi for MockPlaidApi {
    async fn exchange_public_token(
        &self,
        _public_token: &str,
    ) -> Result<PublicTokenExchangeResult, PlaidError> {
        Ok(self.exchange.lock().expect("mock state poisoned").clone())
    }

    async fn accounts_get(&self, _access_token: &str) -> Result<AccountsGetResponse, PlaidError> {
        Ok(self.accounts.lock().expect("mock state poisoned").clone())
    }

    async fn transactions_sync(
        &self,
        _access_token: &str,
        _cursor: Option<&str>,
    ) -> Result<TransactionsSyncResponse, PlaidError> {
        Ok(self.transactions.lock().expect("mock state poisoned").clone())
    }

    async fn link_token_create(
        &self,
        _client_user_id: &str,
    ) -> Result<LinkTokenCreateResponse, PlaidError> {
        Ok(LinkTokenCreateResponse {
            link_token: self.link_token.lock().expect("mock state poisoned").clone(),
        })
    }
}
