use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::dtos::{AccountDto, AccountsResponse};
use crate::middleware::AuthUser;
use crate::AppState;

/// The authenticated user's accounts as last reconciled.
pub async fn get_accounts(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let accounts = state
        .db
        .accounts_for_user(&user.0.sub)
        .await?
        .into_iter()
        .map(AccountDto::from)
        .collect();

    Ok(Json(AccountsResponse { accounts }))
}
