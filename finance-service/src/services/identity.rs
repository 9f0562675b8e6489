//! Identity-token verification.
//!
//! ID tokens are RS256 JWTs issued by the external identity provider and
//! verified locally against the provider's published JWKS. The trait seam
//! lets tests substitute a static verifier.

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Failed to fetch signing keys: {0}")]
    KeyFetch(String),

    #[error("Unknown signing key: {0}")]
    UnknownKey(String),
}

// Any verification failure is an authorization failure to the caller;
// the specific cause is only logged.
impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        AppError::Unauthorized(anyhow::anyhow!(err.to_string()))
    }
}

/// Claims extracted from a verified ID token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject: the provider-assigned user identifier.
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Identity provider configuration.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub jwks_url: String,
    pub issuer: String,
    pub audience: String,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<IdentityClaims, IdentityError>;
}

// ============================================================================
// JWKS verifier
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

pub struct JwksVerifier {
    config: IdentityConfig,
    client: Client,
    keys: RwLock<HashMap<String, Jwk>>,
}

impl JwksVerifier {
    pub fn new(config: IdentityConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            client,
            keys: RwLock::new(HashMap::new()),
        }
    }

    async fn refresh_keys(&self) -> Result<(), IdentityError> {
        let jwks: JwkSet = self
            .client
            .get(&self.config.jwks_url)
            .send()
            .await
            .map_err(|e| IdentityError::KeyFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| IdentityError::KeyFetch(e.to_string()))?;

        let mut keys = self.keys.write().await;
        keys.clear();
        for key in jwks.keys {
            keys.insert(key.kid.clone(), key);
        }

        tracing::debug!(key_count = keys.len(), "Refreshed identity signing keys");
        Ok(())
    }

    /// Cached key lookup with a single refetch on miss (key rotation).
    async fn key_for(&self, kid: &str) -> Result<Jwk, IdentityError> {
        if let Some(key) = self.keys.read().await.get(kid) {
            return Ok(key.clone());
        }

        self.refresh_keys().await?;

        self.keys
            .read()
            .await
            .get(kid)
            .cloned()
            .ok_or_else(|| IdentityError::UnknownKey(kid.to_string()))
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<IdentityClaims, IdentityError> {
        let header =
            decode_header(token).map_err(|e| IdentityError::InvalidToken(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::InvalidToken("missing key id".to_string()))?;

        let jwk = self.key_for(&kid).await?;
        let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.config.audience]);
        validation.set_issuer(&[&self.config.issuer]);

        let data = decode::<IdentityClaims>(token, &key, &validation)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;

        Ok(data.claims)
    }
}

// ============================================================================
// Static verifier (tests)
// ============================================================================

/// Maps fixed bearer strings to claims; everything else is rejected.
#[derive(Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, IdentityClaims>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, claims: IdentityClaims) -> Self {
        self.tokens.insert(token.to_string(), claims);
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<IdentityClaims, IdentityError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| IdentityError::InvalidToken("unknown test token".to_string()))
    }
}
