//! Configuration module for finance-service.

use crate::services::advice::AdviceConfig;
use crate::services::identity::IdentityConfig;
use crate::services::plaid::PlaidConfig;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct FinanceConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub identity: IdentityConfig,
    pub plaid: PlaidConfig,
    pub advice: AdviceConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl FinanceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let identity_project = env::var("IDENTITY_PROJECT_ID")
            .map_err(|_| AppError::ConfigError(anyhow::anyhow!("IDENTITY_PROJECT_ID is required")))?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "finance-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            identity: IdentityConfig {
                jwks_url: env::var("IDENTITY_JWKS_URL").unwrap_or_else(|_| {
                    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com"
                        .to_string()
                }),
                issuer: env::var("IDENTITY_ISSUER").unwrap_or_else(|_| {
                    format!("https://securetoken.google.com/{}", identity_project)
                }),
                audience: identity_project,
            },
            plaid: PlaidConfig {
                base_url: plaid_base_url(
                    &env::var("PLAID_ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string()),
                ),
                client_id: env::var("PLAID_CLIENT_ID").unwrap_or_default(),
                secret: env::var("PLAID_SECRET").unwrap_or_default(),
                client_name: env::var("PLAID_CLIENT_NAME")
                    .unwrap_or_else(|_| "finance-service".to_string()),
                products: csv_list(
                    &env::var("PLAID_PRODUCTS").unwrap_or_else(|_| "transactions".to_string()),
                ),
                country_codes: csv_list(
                    &env::var("PLAID_COUNTRY_CODES").unwrap_or_else(|_| "US".to_string()),
                ),
                language: env::var("PLAID_LANGUAGE").unwrap_or_else(|_| "en".to_string()),
            },
            advice: AdviceConfig {
                base_url: env::var("ADVICE_BASE_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string()),
                timeout_secs: env::var("ADVICE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            },
        })
    }
}

fn plaid_base_url(environment: &str) -> String {
    match environment {
        "production" => "https://production.plaid.com".to_string(),
        "development" => "https://development.plaid.com".to_string(),
        _ => "https://sandbox.plaid.com".to_string(),
    }
}

fn csv_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
