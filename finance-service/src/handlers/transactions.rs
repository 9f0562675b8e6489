use axum::{extract::State, response::IntoResponse, Json};
use chrono::{Months, NaiveDate};
use service_core::error::AppError;

use crate::dtos::{MonthRequest, TransactionDto, TransactionsResponse};
use crate::middleware::AuthUser;
use crate::AppState;

/// The authenticated user's transactions, optionally filtered to one
/// `MM/yyyy` month. A null body or null filter returns the full history.
pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<Option<MonthRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let month_year = request.and_then(|r| r.month_year);

    let window = match month_year {
        Some(ref raw) => {
            let start = parse_month_year(raw).ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!(
                    "Invalid month format. Please use the **MM/YYYY** format. \
                     Or, pass in null to get complete transaction history."
                ))
            })?;
            let end_exclusive = start
                .checked_add_months(Months::new(1))
                .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid target month")))?;
            Some((start, end_exclusive))
        }
        None => None,
    };

    let transactions: Vec<TransactionDto> = state
        .db
        .transactions_for_user(&user.0.sub, window)
        .await?
        .into_iter()
        .map(TransactionDto::from)
        .collect();

    Ok(Json(TransactionsResponse {
        transaction_count: transactions.len(),
        transactions,
    }))
}

/// Strict `MM/yyyy` parse: two-digit month, four-digit year.
pub(crate) fn parse_month_year(raw: &str) -> Option<NaiveDate> {
    let (month, year) = raw.split_once('/')?;
    if month.len() != 2 || year.len() != 4 {
        return None;
    }

    let month: u32 = month.parse().ok()?;
    let year: i32 = year.parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_month() {
        assert_eq!(
            parse_month_year("03/2024"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(
            parse_month_year("12/1999"),
            NaiveDate::from_ymd_opt(1999, 12, 1)
        );
    }

    #[test]
    fn rejects_malformed_months() {
        assert_eq!(parse_month_year("3/2024"), None);
        assert_eq!(parse_month_year("03/24"), None);
        assert_eq!(parse_month_year("13/2024"), None);
        assert_eq!(parse_month_year("00/2024"), None);
        assert_eq!(parse_month_year("2024-03"), None);
        assert_eq!(parse_month_year("march"), None);
        assert_eq!(parse_month_year(""), None);
    }
}
