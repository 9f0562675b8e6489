//! Unauthenticated diagnostic routes for exercising the advice pipeline.
//! Unlike the core advice path, failures here surface as gateway errors so
//! operators can see exactly what broke.

use axum::{extract::State, response::IntoResponse, Json};
use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;

use crate::dtos::{CategorySpending, SpendingContext, TestLlmRequest};
use crate::services::spending::SpendingService;
use crate::AppState;

const DEFAULT_TEST_QUERY: &str = "How can I cut down on expenses and save more?";

#[derive(Debug, Serialize)]
pub struct TestLlmDummyResponse {
    pub test_mode: String,
    pub query: String,
    pub month: String,
    pub year: i32,
    pub spending_summary: Vec<CategorySpending>,
    pub total_spending: Decimal,
    pub total_categories: usize,
    pub llm_response: String,
}

#[derive(Debug, Serialize)]
pub struct TestLlmResponse {
    pub user: String,
    pub query: String,
    pub month: String,
    pub year: i32,
    pub spending_summary: Vec<CategorySpending>,
    pub total_categories: usize,
    pub total_spending: Decimal,
    pub llm_response: String,
}

#[derive(Debug, Serialize)]
pub struct TestLlmEmptyResponse {
    pub warning: String,
    pub user: String,
    pub month: String,
    pub year: i32,
    pub spending: Vec<CategorySpending>,
    pub llm_response: String,
}

fn dummy_spending() -> Vec<CategorySpending> {
    let bucket = |category: &str, cents: i64| CategorySpending {
        category: category.to_string(),
        amount: Decimal::new(cents, 2),
    };

    vec![
        bucket("FOOD_AND_DRINK", 850_50),
        bucket("TRANSPORTATION", 320_00),
        bucket("GENERAL_MERCHANDISE", 275_99),
        bucket("ENTERTAINMENT", 180_00),
        bucket("GENERAL_SERVICES", 150_00),
        bucket("HOME_IMPROVEMENT", 125_75),
        bucket("RENT_AND_UTILITIES", 1200_00),
    ]
}

/// Exercise the advice endpoint with fixed dummy data; no database needed.
pub async fn test_llm_dummy(
    State(state): State<AppState>,
    Json(request): Json<TestLlmRequest>,
) -> Result<impl IntoResponse, AppError> {
    let query = request
        .query
        .unwrap_or_else(|| DEFAULT_TEST_QUERY.to_string());

    let now = Utc::now();
    let target_month = request.month.unwrap_or_else(|| now.month());
    let target_year = request.year.unwrap_or_else(|| now.year());
    let month_name = chrono::NaiveDate::from_ymd_opt(target_year, target_month, 1)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid target month")))?
        .format("%B")
        .to_string();

    let spending = dummy_spending();
    let context = SpendingContext {
        month: month_name.clone(),
        year: target_year,
        spending: spending.clone(),
    };

    let data_context = serde_json::to_string(&context).map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("Failed to serialize spending context: {}", e))
    })?;

    tracing::info!(data_context = %data_context, "Testing advice endpoint with dummy data");

    let llm_response = state.advice.analyze(&query, &data_context).await?;

    let total_spending = spending.iter().map(|s| s.amount).sum();
    Ok(Json(TestLlmDummyResponse {
        test_mode: "dummy_data".to_string(),
        query,
        month: month_name,
        year: target_year,
        total_spending,
        total_categories: spending.len(),
        spending_summary: spending,
        llm_response,
    }))
}

/// Exercise the full aggregation + advice pipeline against the first user
/// in the store.
pub async fn test_llm(
    State(state): State<AppState>,
    Json(request): Json<TestLlmRequest>,
) -> Result<impl IntoResponse, AppError> {
    let Some(test_user) = state.db.first_user().await? else {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "No users found in database. Please sync some data first."
        )));
    };

    let query = request
        .query
        .unwrap_or_else(|| DEFAULT_TEST_QUERY.to_string());

    tracing::info!(user = %test_user.email, "Testing advice pipeline");

    let spending = SpendingService::new(state.db.clone(), state.advice.clone());
    let data = spending
        .spending_data(&test_user.user_id, request.month, request.year)
        .await?;

    if data.spending.is_empty() {
        return Ok(Json(TestLlmEmptyResponse {
            warning: "No transaction data found for this period.".to_string(),
            user: test_user.email,
            month: data.month,
            year: data.year,
            spending: data.spending,
            llm_response: "No data available to analyze.".to_string(),
        })
        .into_response());
    }

    let llm_response = spending
        .financial_advice(&query, &test_user.user_id, request.month, request.year)
        .await?;

    let total_spending = data.spending.iter().map(|s| s.amount).sum();
    Ok(Json(TestLlmResponse {
        user: test_user.email,
        query,
        month: data.month,
        year: data.year,
        total_categories: data.spending.len(),
        total_spending,
        spending_summary: data.spending.into_iter().take(5).collect(),
        llm_response,
    })
    .into_response())
}
