//! Spending aggregation and advice pass-through integration tests.

mod common;

use chrono::{Datelike, Utc};
use common::{plaid_account, plaid_transaction, spawn_app, sync_payload};
use serial_test::serial;
use finance_service::services::plaid::PlaidTransaction;

fn with_category(mut tx: PlaidTransaction, primary: Option<&str>) -> PlaidTransaction {
    if let Some(category) = tx.personal_finance_category.as_mut() {
        category.primary = primary.map(str::to_string);
    }
    tx
}

async fn seed_march_2024(app: &common::TestApp) {
    app.plaid.set_transactions(sync_payload(
        vec![
            with_category(
                plaid_transaction("t1", "a1", "50.00", (2024, 3, 5), "Grocer"),
                Some("FOOD"),
            ),
            // Refund: negative amounts must not count as spending.
            with_category(
                plaid_transaction("t2", "a1", "-20.00", (2024, 3, 6), "Grocer"),
                Some("FOOD"),
            ),
            with_category(
                plaid_transaction("t3", "a1", "0.00", (2024, 3, 7), "Grocer"),
                Some("FOOD"),
            ),
            with_category(
                plaid_transaction("t4", "a1", "5.00", (2024, 3, 8), "Kiosk"),
                None,
            ),
            with_category(
                plaid_transaction("t5", "a1", "1200.00", (2024, 3, 1), "Landlord"),
                Some("RENT_AND_UTILITIES"),
            ),
        ],
        vec![],
        vec![],
        "c1",
    ));
    app.link_and_sync(vec![plaid_account("a1", "Checking", "100.00")])
        .await;
}

#[tokio::test]
#[serial]
async fn spending_data_groups_sums_and_sorts_descending() {
    let Some(app) = spawn_app().await else { return };
    seed_march_2024(&app).await;

    let response = app.get("/api/llm/spending-data?month=3&year=2024").await;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["month"], "March");
    assert_eq!(body["year"], 2024);

    let spending = body["spending"].as_array().unwrap();
    assert_eq!(spending.len(), 3);
    assert_eq!(spending[0]["category"], "RENT_AND_UTILITIES");
    assert_eq!(spending[0]["amount"], serde_json::json!(1200.0));
    assert_eq!(spending[1]["category"], "FOOD");
    // 50 - 20 + 0 would be 30; refunds and zero amounts are excluded, so 50.
    assert_eq!(spending[1]["amount"], serde_json::json!(50.0));
    assert_eq!(spending[2]["category"], "Uncategorized");
    assert_eq!(spending[2]["amount"], serde_json::json!(5.0));
}

#[tokio::test]
#[serial]
async fn empty_window_yields_empty_spending_list() {
    let Some(app) = spawn_app().await else { return };
    seed_march_2024(&app).await;

    let response = app.get("/api/llm/spending-data?month=1&year=2000").await;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["spending"].as_array().unwrap().len(), 0);
}

#[tokio::test]
#[serial]
async fn raw_data_contract_silently_clamps_out_of_range_month() {
    let Some(app) = spawn_app().await else { return };
    assert_eq!(app.get("/api/user").await.status(), 200);

    let response = app.get("/api/llm/spending-data?month=13&year=2024").await;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let current_month = Utc::now().format("%B").to_string();
    assert_eq!(body["month"], current_month);
    assert_eq!(body["year"], 2024);
}

#[tokio::test]
#[serial]
async fn advice_query_relays_endpoint_response() {
    let Some(app) = spawn_app().await else { return };
    seed_march_2024(&app).await;

    let response = app
        .post_json(
            "/api/llm/query",
            &serde_json::json!({ "query": "Where does my money go?", "month": 3, "year": 2024 }),
        )
        .await;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["response"], "Mock advice for: Where does my money go?");
    assert_eq!(app.advice.call_count(), 1);

    // The serialized context carries the aggregation the endpoint saw.
    let context = app.advice.last_context.lock().unwrap().clone().unwrap();
    assert!(context.contains("\"month\":\"March\""));
    assert!(context.contains("RENT_AND_UTILITIES"));
}

#[tokio::test]
#[serial]
async fn advice_query_rejects_out_of_range_month_without_calling_endpoint() {
    let Some(app) = spawn_app().await else { return };
    assert_eq!(app.get("/api/user").await.status(), 200);

    let response = app
        .post_json(
            "/api/llm/query",
            &serde_json::json!({ "query": "Anything?", "month": 13 }),
        )
        .await;
    assert_eq!(response.status(), 400);
    assert_eq!(app.advice.call_count(), 0);
}

#[tokio::test]
#[serial]
async fn advice_query_rejects_blank_query() {
    let Some(app) = spawn_app().await else { return };
    assert_eq!(app.get("/api/user").await.status(), 200);

    for body in [
        serde_json::json!({ "query": "" }),
        serde_json::json!({ "query": "   " }),
        serde_json::json!({}),
    ] {
        let response = app.post_json("/api/llm/query", &body).await;
        assert_eq!(response.status(), 400);
    }
    assert_eq!(app.advice.call_count(), 0);
}

#[tokio::test]
#[serial]
async fn advice_failure_is_downgraded_to_string_result() {
    let Some(app) = spawn_app().await else { return };
    seed_march_2024(&app).await;

    app.advice.fail_with_network_error();

    let response = app
        .post_json(
            "/api/llm/query",
            &serde_json::json!({ "query": "Still there?" }),
        )
        .await;
    assert_eq!(response.status(), 200, "advice is best-effort");

    let body: serde_json::Value = response.json().await.unwrap();
    let text = body["response"].as_str().unwrap();
    assert!(
        text.starts_with("Error connecting to AI service:"),
        "got: {}",
        text
    );
}

#[tokio::test]
#[serial]
async fn diagnostic_dummy_route_surfaces_advice_failures() {
    let Some(app) = spawn_app().await else { return };

    // No auth header on diagnostic routes.
    let response = app
        .client
        .post(format!("{}/api/test/llm-dummy", app.address))
        .json(&serde_json::json!({ "query": "Test me" }))
        .send()
        .await
        .expect("request failed");
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["test_mode"], "dummy_data");
    assert_eq!(body["llm_response"], "Mock advice for: Test me");
    assert_eq!(body["total_categories"], 7);

    app.advice.fail_with_network_error();
    let response = app
        .client
        .post(format!("{}/api/test/llm-dummy", app.address))
        .json(&serde_json::json!({}))
        .send()
        .await
        .expect("request failed");
    assert_eq!(
        response.status(),
        503,
        "diagnostic routes surface failures instead of downgrading them"
    );
}

#[tokio::test]
#[serial]
async fn months_default_to_current_calendar_month() {
    let Some(app) = spawn_app().await else { return };
    assert_eq!(app.get("/api/user").await.status(), 200);

    let response = app.get("/api/llm/spending-data").await;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let now = Utc::now();
    assert_eq!(body["month"], now.format("%B").to_string());
    assert_eq!(body["year"], now.year());
}
