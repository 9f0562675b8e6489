//! Advice endpoints: natural-language query over aggregated spending, and
//! the raw aggregation without the advice call.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;

use crate::dtos::{LlmQueryRequest, LlmQueryResponse};
use crate::middleware::AuthUser;
use crate::services::SpendingService;
use crate::AppState;

pub async fn query(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<LlmQueryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let query = request.query.unwrap_or_default();
    if query.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Query cannot be empty"
        )));
    }

    let spending = SpendingService::new(state.db.clone(), state.advice.clone());
    let response = spending
        .financial_advice(&query, &user.0.sub, request.month, request.year)
        .await?;

    Ok(Json(LlmQueryResponse { response }))
}

#[derive(Debug, Deserialize)]
pub struct SpendingDataQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
}

pub async fn spending_data(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<SpendingDataQuery>,
) -> Result<impl IntoResponse, AppError> {
    let spending = SpendingService::new(state.db.clone(), state.advice.clone());
    let context = spending
        .spending_data(&user.0.sub, params.month, params.year)
        .await?;

    Ok(Json(context))
}
