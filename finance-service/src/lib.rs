pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

use axum::{
    extract::State,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::FinanceConfig;
use crate::services::advice::AdviceApi;
use crate::services::identity::TokenVerifier;
use crate::services::plaid::PlaidApi;
use crate::services::Database;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: FinanceConfig,
    pub db: Arc<Database>,
    pub plaid: Arc<dyn PlaidApi>,
    pub advice: Arc<dyn AdviceApi>,
    pub verifier: Arc<dyn TokenVerifier>,
}

pub fn build_router(state: AppState) -> Router {
    // Everything under /api except the diagnostic routes requires a
    // verified bearer identity token.
    let protected = Router::new()
        .route(
            "/api/exchange_public_token",
            post(handlers::link::exchange_public_token),
        )
        .route("/api/accounts", get(handlers::accounts::get_accounts))
        .route(
            "/api/transactions",
            post(handlers::transactions::list_transactions),
        )
        .route("/api/user", get(handlers::user::get_user))
        .route("/api/sync", get(handlers::sync::sync))
        .route("/api/llm/query", post(handlers::llm::query))
        .route("/api/llm/spending-data", get(handlers::llm::spending_data))
        .route(
            "/api/create_link_token",
            post(handlers::link::create_link_token),
        )
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route(
            "/api/test/llm-dummy",
            post(handlers::diagnostics::test_llm_dummy),
        )
        .route("/api/test/llm", post(handlers::diagnostics::test_llm))
        .merge(protected)
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        // The browser frontend is served elsewhere; any origin may call.
        .layer(CorsLayer::permissive())
}

/// Service health check.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.db.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        e
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
    })))
}
