//! Aggregator link-session endpoints: token exchange and link token
//! creation.

use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::dtos::{PublicTokenExchangeRequest, PublicTokenExchangeResponse};
use crate::middleware::AuthUser;
use crate::AppState;

/// Exchange a public token for a long-lived access token and store it on
/// the user; the sync cursor is cleared so the next sync starts fresh.
pub async fn exchange_public_token(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<PublicTokenExchangeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let exchange = state
        .plaid
        .exchange_public_token(&request.public_token)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Public token exchange failed");
            AppError::BadRequest(anyhow::anyhow!(e.to_string()))
        })?;

    let found = state
        .db
        .set_plaid_credentials(&user.0.sub, &exchange.access_token, &exchange.item_id)
        .await?;

    if !found {
        return Err(AppError::NotFound(anyhow::anyhow!("User not found")));
    }

    Ok(Json(PublicTokenExchangeResponse {
        public_token_exchange: "complete".to_string(),
    }))
}

/// Request a new aggregator link session token for the authenticated user.
pub async fn create_link_token(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let response = state
        .plaid
        .link_token_create(&user.0.sub)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Link token creation failed");
            AppError::BadRequest(anyhow::anyhow!(e.to_string()))
        })?;

    Ok(Json(response.link_token))
}
