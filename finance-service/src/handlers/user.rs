use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::dtos::UserDto;
use crate::middleware::AuthUser;
use crate::AppState;

/// The authenticated user's profile, with transaction months formatted as
/// `MM/yyyy` strings.
pub async fn get_user(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let record = state
        .db
        .get_user(&user.0.sub)
        .await?
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unable to return a user.")))?;

    Ok(Json(UserDto {
        email: record.email,
        full_name: record.full_name,
        date_of_birth: record.date_of_birth,
        last_sync_time: record.last_sync_time,
        transaction_months: record
            .transaction_months
            .iter()
            .map(|month| month.format("%m/%Y").to_string())
            .collect(),
    }))
}
