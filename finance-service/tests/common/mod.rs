//! Common test utilities for finance-service integration tests.
//!
//! These tests need a PostgreSQL instance via TEST_DATABASE_URL; when the
//! variable is unset, `spawn_app` returns None and each test skips itself.

#![allow(dead_code)]

use finance_service::config::{DatabaseConfig, FinanceConfig};
use finance_service::services::advice::{AdviceConfig, MockAdviceApi};
use finance_service::services::identity::{IdentityClaims, IdentityConfig, StaticTokenVerifier};
use finance_service::services::plaid::{
    AccountBalances, MockPlaidApi, PersonalFinanceCategory, PlaidAccount, PlaidConfig,
    PlaidTransaction, RemovedTransaction, TransactionsSyncResponse,
};
use finance_service::services::Database;
use finance_service::startup::Application;
use finance_service::AppState;
use chrono::NaiveDate;
use service_core::config::Config as CommonConfig;
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,finance_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn test_config(database_url: String) -> FinanceConfig {
    FinanceConfig {
        common: CommonConfig { port: 0 },
        service_name: "finance-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        database: DatabaseConfig {
            url: database_url,
            max_connections: 2,
            min_connections: 1,
        },
        identity: IdentityConfig {
            jwks_url: String::new(),
            issuer: "test".to_string(),
            audience: "test".to_string(),
        },
        plaid: PlaidConfig {
            base_url: String::new(),
            client_id: String::new(),
            secret: String::new(),
            client_name: "finance-service-test".to_string(),
            products: vec!["transactions".to_string()],
            country_codes: vec!["US".to_string()],
            language: "en".to_string(),
        },
        advice: AdviceConfig {
            base_url: String::new(),
            timeout_secs: 1,
        },
    }
}

/// Test application wrapper.
pub struct TestApp {
    pub address: String,
    pub db: Arc<Database>,
    pub plaid: Arc<MockPlaidApi>,
    pub advice: Arc<MockAdviceApi>,
    pub client: reqwest::Client,
    /// Bearer token for the test user.
    pub token: String,
    /// A second token for the same subject carrying refreshed claims.
    pub refreshed_token: String,
    pub user_id: String,
    pub email: String,
    pub refreshed_email: String,
}

impl TestApp {
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .bearer_auth(&self.token)
            .send()
            .await
            .expect("request failed")
    }

    pub async fn post_json(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .expect("request failed")
    }

    /// Stage accounts in the mock aggregator and link + sync them through
    /// the API.
    pub async fn link_and_sync(&self, accounts: Vec<PlaidAccount>) {
        self.plaid.set_accounts(accounts);

        let response = self
            .post_json(
                "/api/exchange_public_token",
                &serde_json::json!({ "publicToken": "public-sandbox-test" }),
            )
            .await;
        assert_eq!(response.status(), 200, "token exchange failed");

        let response = self.get("/api/sync").await;
        assert_eq!(response.status(), 204, "sync failed");
    }
}

/// Spawn a test application with mock providers and a fresh test user.
/// Returns None (skipping the test) when TEST_DATABASE_URL is unset.
pub async fn spawn_app() -> Option<TestApp> {
    init_tracing();

    let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping integration test");
        return None;
    };

    let db = Database::new(&database_url, 2, 1)
        .await
        .expect("Failed to connect to test database");
    db.run_migrations()
        .await
        .expect("Failed to run migrations");
    let db = Arc::new(db);

    let suffix = Uuid::new_v4();
    let user_id = format!("user-{}", suffix);
    let email = format!("user-{}@example.com", suffix);
    let refreshed_email = format!("refreshed-{}@example.com", suffix);
    let token = format!("token-{}", suffix);
    let refreshed_token = format!("refreshed-token-{}", suffix);

    let verifier = StaticTokenVerifier::new()
        .with_token(
            &token,
            IdentityClaims {
                sub: user_id.clone(),
                email: Some(email.clone()),
                name: Some("Test User".to_string()),
            },
        )
        .with_token(
            &refreshed_token,
            IdentityClaims {
                sub: user_id.clone(),
                email: Some(refreshed_email.clone()),
                name: Some("Renamed User".to_string()),
            },
        );

    let plaid = Arc::new(MockPlaidApi::new());
    let advice = Arc::new(MockAdviceApi::new());

    let state = AppState {
        config: test_config(database_url),
        db: db.clone(),
        plaid: plaid.clone(),
        advice: advice.clone(),
        verifier: Arc::new(verifier),
    };

    let app = Application::with_state(state)
        .await
        .expect("Failed to build application");
    let port = app.port();

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    Some(TestApp {
        address: format!("http://127.0.0.1:{}", port),
        db,
        plaid,
        advice,
        client: reqwest::Client::new(),
        token,
        refreshed_token,
        user_id,
        email,
        refreshed_email,
    })
}

// ============================================================================
// Payload builders
// ============================================================================

pub fn plaid_account(id: &str, name: &str, balance: &str) -> PlaidAccount {
    PlaidAccount {
        account_id: id.to_string(),
        name: name.to_string(),
        official_name: Some(format!("{} Official", name)),
        mask: Some("0000".to_string()),
        account_type: "depository".to_string(),
        balances: AccountBalances {
            current: Some(balance.parse().expect("bad balance literal")),
        },
    }
}

pub fn plaid_transaction(
    id: &str,
    account_id: &str,
    amount: &str,
    date: (i32, u32, u32),
    merchant: &str,
) -> PlaidTransaction {
    PlaidTransaction {
        transaction_id: id.to_string(),
        account_id: account_id.to_string(),
        amount: Some(amount.parse().expect("bad amount literal")),
        date: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
        name: Some(format!("{} purchase", merchant)),
        merchant_name: Some(merchant.to_string()),
        counterparties: Vec::new(),
        pending: Some(false),
        personal_finance_category: Some(PersonalFinanceCategory {
            primary: Some("FOOD_AND_DRINK".to_string()),
            detailed: Some("FOOD_AND_DRINK_RESTAURANT".to_string()),
            confidence_level: Some("HIGH".to_string()),
        }),
    }
}

pub fn sync_payload(
    added: Vec<PlaidTransaction>,
    modified: Vec<PlaidTransaction>,
    removed: Vec<&str>,
    next_cursor: &str,
) -> TransactionsSyncResponse {
    TransactionsSyncResponse {
        added,
        modified,
        removed: removed
            .into_iter()
            .map(|id| RemovedTransaction {
                transaction_id: id.to_string(),
            })
            .collect(),
        next_cursor: next_cursor.to_string(),
        has_more: false,
    }
}
