use axum::{extract::State, http::StatusCode, response::IntoResponse};
use service_core::error::AppError;

use crate::middleware::AuthUser;
use crate::services::SyncService;
use crate::AppState;

/// Full reconciliation for the authenticated user: fresh account snapshot,
/// then the incremental transaction delta. 204 on success.
pub async fn sync(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let sync_service = SyncService::new(state.db.clone(), state.plaid.clone());

    sync_service.sync_all(&user.0.sub).await.map_err(|e| {
        tracing::error!(error = %e, "Sync failed");
        AppError::from(e)
    })?;

    Ok(StatusCode::NO_CONTENT)
}
