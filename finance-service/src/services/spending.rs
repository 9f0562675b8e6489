//! Spending aggregation and the advice pass-through.

use crate::dtos::{CategorySpending, SpendingContext};
use crate::services::advice::{AdviceApi, AdviceError};
use crate::services::database::Database;
use crate::services::metrics::record_advice_request;
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Category label for transactions the aggregator left unclassified.
const UNCATEGORIZED: &str = "Uncategorized";

pub struct SpendingService {
    db: Arc<Database>,
    advice: Arc<dyn AdviceApi>,
}

impl SpendingService {
    pub fn new(db: Arc<Database>, advice: Arc<dyn AdviceApi>) -> Self {
        Self { db, advice }
    }

    /// Aggregated spending for the target month. An out-of-range explicit
    /// month is silently clamped to the current month here; the advice path
    /// rejects it instead. The asymmetry is inherited policy, kept distinct
    /// per call site.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn spending_data(
        &self,
        user_id: &str,
        month: Option<u32>,
        year: Option<i32>,
    ) -> Result<SpendingContext, AppError> {
        let (target_year, target_month) = clamp_target_month(month, year, Utc::now());
        self.aggregate_window(user_id, target_year, target_month)
            .await
    }

    /// Aggregate spending, serialize it, and relay the advice endpoint's
    /// answer. Provider failures come back as descriptive strings rather
    /// than errors: advice is best-effort and must not fail the request.
    #[instrument(skip(self, query), fields(user_id = %user_id))]
    pub async fn financial_advice(
        &self,
        query: &str,
        user_id: &str,
        month: Option<u32>,
        year: Option<i32>,
    ) -> Result<String, AppError> {
        let (target_year, target_month) = resolve_target_month(month, year, Utc::now())?;
        let context = self
            .aggregate_window(user_id, target_year, target_month)
            .await?;

        let data_context = serde_json::to_string(&context).map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Failed to serialize spending context: {}", e))
        })?;

        info!(
            month = %context.month,
            year = context.year,
            categories = context.spending.len(),
            "Requesting financial advice"
        );

        match self.advice.analyze(query, &data_context).await {
            Ok(text) => {
                record_advice_request("success");
                Ok(text)
            }
            Err(AdviceError::Empty) => {
                record_advice_request("empty");
                Ok("Error: Received an empty response from the AI service.".to_string())
            }
            Err(e) => {
                record_advice_request("error");
                tracing::warn!(error = %e, "Advice endpoint call failed");
                Ok(format!("Error connecting to AI service: {}", e))
            }
        }
    }

    async fn aggregate_window(
        &self,
        user_id: &str,
        target_year: i32,
        target_month: u32,
    ) -> Result<SpendingContext, AppError> {
        let (start, end) = month_window(target_year, target_month)
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid target month")))?;

        let rows = self.db.spending_rows(user_id, start, end).await?;
        let spending = aggregate_spending(rows);

        Ok(SpendingContext {
            month: start.format("%B").to_string(),
            year: target_year,
            spending,
        })
    }
}

/// Advice-query contract: an explicit month outside 1-12 is an error.
pub(crate) fn resolve_target_month(
    month: Option<u32>,
    year: Option<i32>,
    now: DateTime<Utc>,
) -> Result<(i32, u32), AppError> {
    let target_month = month.unwrap_or_else(|| now.month());
    let target_year = year.unwrap_or_else(|| now.year());

    if !(1..=12).contains(&target_month) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Month must be between 1 and 12"
        )));
    }

    Ok((target_year, target_month))
}

/// Raw-data contract: an explicit month outside 1-12 falls back to the
/// current month without error. The year is kept as passed.
pub(crate) fn clamp_target_month(
    month: Option<u32>,
    year: Option<i32>,
    now: DateTime<Utc>,
) -> (i32, u32) {
    let mut target_month = month.unwrap_or_else(|| now.month());
    let target_year = year.unwrap_or_else(|| now.year());

    if !(1..=12).contains(&target_month) {
        target_month = now.month();
    }

    (target_year, target_month)
}

/// First and last day of the month, both inclusive.
pub(crate) fn month_window(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = start.checked_add_months(Months::new(1))?.pred_opt()?;
    Some((start, end))
}

/// Keep expenses (strictly positive amounts), group by primary category,
/// sum, and sort descending by total.
pub(crate) fn aggregate_spending(rows: Vec<(Option<String>, Decimal)>) -> Vec<CategorySpending> {
    let mut totals: HashMap<String, Decimal> = HashMap::new();

    for (category, amount) in rows {
        if amount <= Decimal::ZERO {
            continue;
        }
        let category = category.unwrap_or_else(|| UNCATEGORIZED.to_string());
        *totals.entry(category).or_default() += amount;
    }

    let mut spending: Vec<CategorySpending> = totals
        .into_iter()
        .map(|(category, amount)| CategorySpending { category, amount })
        .collect();
    spending.sort_by(|a, b| b.amount.cmp(&a.amount));
    spending
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn dec(value: i64, scale: u32) -> Decimal {
        Decimal::new(value, scale)
    }

    #[test]
    fn resolve_rejects_out_of_range_month() {
        assert!(resolve_target_month(Some(13), Some(2024), now()).is_err());
        assert!(resolve_target_month(Some(0), Some(2024), now()).is_err());
    }

    #[test]
    fn resolve_defaults_to_current_month_and_year() {
        assert_eq!(resolve_target_month(None, None, now()).unwrap(), (2024, 6));
        assert_eq!(
            resolve_target_month(Some(3), None, now()).unwrap(),
            (2024, 3)
        );
    }

    #[test]
    fn clamp_falls_back_to_current_month_but_keeps_year() {
        assert_eq!(clamp_target_month(Some(13), Some(2020), now()), (2020, 6));
        assert_eq!(clamp_target_month(Some(3), Some(2020), now()), (2020, 3));
        assert_eq!(clamp_target_month(None, None, now()), (2024, 6));
    }

    #[test]
    fn month_window_covers_whole_month_inclusive() {
        let (start, end) = month_window(2024, 2).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        // 2024 is a leap year.
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let (start, end) = month_window(2024, 12).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
    }

    #[test]
    fn aggregation_excludes_zero_and_negative_amounts() {
        let rows = vec![
            (Some("FOOD".to_string()), dec(50, 0)),
            (Some("FOOD".to_string()), dec(-20, 0)),
            (Some("FOOD".to_string()), Decimal::ZERO),
        ];

        let spending = aggregate_spending(rows);
        assert_eq!(spending.len(), 1);
        assert_eq!(spending[0].category, "FOOD");
        assert_eq!(spending[0].amount, dec(50, 0));
    }

    #[test]
    fn aggregation_groups_and_sorts_descending() {
        let rows = vec![
            (Some("FOOD".to_string()), dec(12_50, 2)),
            (Some("RENT".to_string()), dec(1200, 0)),
            (Some("FOOD".to_string()), dec(7_50, 2)),
            (None, dec(5, 0)),
        ];

        let spending = aggregate_spending(rows);
        assert_eq!(
            spending,
            vec![
                CategorySpending {
                    category: "RENT".to_string(),
                    amount: dec(1200, 0),
                },
                CategorySpending {
                    category: "FOOD".to_string(),
                    amount: dec(20, 0),
                },
                CategorySpending {
                    category: "Uncategorized".to_string(),
                    amount: dec(5, 0),
                },
            ]
        );
    }

    #[test]
    fn aggregation_of_empty_window_is_empty() {
        assert!(aggregate_spending(Vec::new()).is_empty());
    }
}
