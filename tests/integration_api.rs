//! API Integration Tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use core_ledger::api::{
    self,
    routes::{AccountResponse, BalanceResponse, EntryResponse, LinesResponse, TransferResponse},
};
use core_ledger::domain::{AccountId, AccountStatus, EntryStatus, FailureReason, TransferStatus};

mod common;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn transfer_body(from: AccountId, to: AccountId, amount_minor: i64) -> Value {
    json!({
        "from_account_id": from.as_uuid(),
        "to_account_id": to.as_uuid(),
        "amount_minor": amount_minor,
        "currency": "USD",
    })
}

async fn setup_app() -> (common::TestLedger, Router) {
    let ledger = common::setup().await;
    let app = api::app(ledger.engine.clone());
    (ledger, app)
}

#[tokio::test]
async fn test_health_check() {
    let (_ledger, app) = setup_app().await;

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn test_transfer_e2e() {
    let (ledger, app) = setup_app().await;
    let x = ledger.open_funded(1_000).await;
    let y = ledger.open_funded(200).await;

    // 1. Transfer
    let (status, body) = send(&app, post_json("/api/v1/transfers", transfer_body(x, y, 300))).await;
    assert_eq!(status, StatusCode::CREATED);
    let transfer: TransferResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(transfer.status, TransferStatus::Executed);
    assert_eq!(transfer.amount, dec!(3.00));
    let entry_id = transfer.journal_entry_id.expect("entry id");

    // 2. Fetch the transfer back
    let (status, body) = send(&app, get(&format!("/api/v1/transfers/{}", transfer.id))).await;
    assert_eq!(status, StatusCode::OK);
    let fetched: TransferResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(fetched.id, transfer.id);

    // 3. Balances
    let (status, body) = send(&app, get(&format!("/api/v1/accounts/{}/balance", x))).await;
    assert_eq!(status, StatusCode::OK);
    let balance: BalanceResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(balance.balance_minor, 700);
    assert_eq!(balance.balance, dec!(7.00));
    assert_eq!(balance.currency, "USD");

    // 4. Entry
    let (status, body) = send(&app, get(&format!("/api/v1/journal-entries/{}", entry_id))).await;
    assert_eq!(status, StatusCode::OK);
    let entry: EntryResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(entry.status, EntryStatus::Posted);
    assert_eq!(entry.lines.len(), 2);

    // 5. Lines of the receiver, most recent first
    let (status, body) = send(&app, get(&format!("/api/v1/accounts/{}/lines", y))).await;
    assert_eq!(status, StatusCode::OK);
    let lines: LinesResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(lines.lines.len(), 2);
    assert_eq!(lines.lines[0].entry_id, entry_id);
    assert_eq!(lines.lines[0].amount_minor, 300);
}

#[tokio::test]
async fn test_failed_transfer_is_created_with_reason() {
    let (ledger, app) = setup_app().await;
    let x = ledger.open_funded(1_000).await;
    let y = ledger.open_funded(0).await;

    let (status, body) = send(&app, post_json("/api/v1/transfers", transfer_body(x, y, 1_500))).await;
    assert_eq!(status, StatusCode::CREATED);
    let transfer: TransferResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(transfer.status, TransferStatus::Failed);
    assert_eq!(transfer.failure_reason, Some(FailureReason::InsufficientFunds));
    assert_eq!(transfer.journal_entry_id, None);
    assert_eq!(ledger.balance(x).await, 1_000);
}

#[tokio::test]
async fn test_idempotency_key_header() {
    let (ledger, app) = setup_app().await;
    let x = ledger.open_funded(1_000).await;
    let y = ledger.open_funded(0).await;

    let request = |amount_minor: i64| {
        Request::builder()
            .method("POST")
            .uri("/api/v1/transfers")
            .header("content-type", "application/json")
            .header("Idempotency-Key", "invoice-881")
            .body(Body::from(transfer_body(x, y, amount_minor).to_string()))
            .unwrap()
    };

    let (status, body) = send(&app, request(100)).await;
    assert_eq!(status, StatusCode::CREATED);
    let first: TransferResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(first.idempotency_key.as_deref(), Some("invoice-881"));

    let (status, body) = send(&app, request(100)).await;
    assert_eq!(status, StatusCode::CREATED);
    let second: TransferResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(ledger.balance(x).await, 900);

    let (status, body) = send(&app, request(999)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error_code"], "idempotency_conflict");
    assert_eq!(error["retryable"], false);
}

#[tokio::test]
async fn test_not_found_responses() {
    let (_ledger, app) = setup_app().await;
    let id = Uuid::new_v4();

    for (uri, code) in [
        (format!("/api/v1/transfers/{id}"), "transfer_not_found"),
        (format!("/api/v1/journal-entries/{id}"), "entry_not_found"),
        (format!("/api/v1/accounts/{id}"), "account_not_found"),
        (format!("/api/v1/accounts/{id}/balance"), "account_not_found"),
        (format!("/api/v1/accounts/{id}/lines"), "account_not_found"),
    ] {
        let (status, body) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        let error: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(error["error_code"], code);
    }
}

#[tokio::test]
async fn test_unbalanced_entry_rejected() {
    let (ledger, app) = setup_app().await;
    let x = ledger.open_funded(1_000).await;
    let y = ledger.open_funded(0).await;

    let body = json!({
        "entry_type": "ADJUSTMENT",
        "lines": [
            { "account_id": x.as_uuid(), "direction": "DEBIT", "amount_minor": 100, "currency": "USD" },
            { "account_id": y.as_uuid(), "direction": "CREDIT", "amount_minor": 50, "currency": "USD" },
        ],
    });
    let (status, body) = send(&app, post_json("/api/v1/journal-entries", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error_code"], "unbalanced_entry");
    assert_eq!(ledger.balance(x).await, 1_000);
}

#[tokio::test]
async fn test_post_and_reverse_entry() {
    let (ledger, app) = setup_app().await;
    let x = ledger.open_funded(0).await;

    let body = json!({
        "entry_type": "CASH_DEPOSIT",
        "external_reference": "branch-7/slip-42",
        "lines": [
            { "account_id": ledger.cash.as_uuid(), "direction": "DEBIT", "amount_minor": 500, "currency": "USD" },
            { "account_id": x.as_uuid(), "direction": "CREDIT", "amount_minor": 500, "currency": "USD" },
        ],
    });
    let (status, body) = send(&app, post_json("/api/v1/journal-entries", body)).await;
    assert_eq!(status, StatusCode::CREATED);
    let entry: EntryResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(entry.external_reference.as_deref(), Some("branch-7/slip-42"));
    assert_eq!(ledger.balance(x).await, 500);

    let uri = format!("/api/v1/journal-entries/{}/reversal", entry.id);
    let (status, body) = send(&app, post_json(&uri, json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let reversal: EntryResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(reversal.reverses, Some(entry.id));
    assert_eq!(ledger.balance(x).await, 0);

    let (status, body) = send(&app, post_json(&uri, json!({}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error_code"], "entry_already_reversed");
}

#[tokio::test]
async fn test_account_endpoints() {
    let (_ledger, app) = setup_app().await;

    let body = json!({ "holder_id": Uuid::new_v4(), "currency": "EUR", "overdraft_limit_minor": 2500 });
    let (status, body) = send(&app, post_json("/api/v1/accounts", body)).await;
    assert_eq!(status, StatusCode::CREATED);
    let account: AccountResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(account.status, AccountStatus::Pending);
    assert_eq!(account.currency, "EUR");
    assert_eq!(account.balance_minor, 0);
    assert_eq!(account.overdraft_limit_minor, 2500);

    let uri = format!("/api/v1/accounts/{}/status", account.id);
    let (status, body) = send(&app, post_json(&uri, json!({ "status": "ACTIVE" }))).await;
    assert_eq!(status, StatusCode::OK);
    let active: AccountResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(active.status, AccountStatus::Active);

    let (status, _) = send(&app, post_json(&uri, json!({ "status": "PENDING" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({ "holder_id": Uuid::new_v4(), "currency": "US1" });
    let (status, body) = send(&app, post_json("/api/v1/accounts", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error_code"], "invalid_currency");
}

#[tokio::test]
async fn test_lines_query_validation() {
    let (ledger, app) = setup_app().await;
    let x = ledger.open_funded(100).await;

    let uri = format!("/api/v1/accounts/{}/lines?from=2025-03-11&to=2025-03-10", x);
    let (status, body) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error_code"], "invalid_request");

    let uri = format!("/api/v1/accounts/{}/lines?from=2025-03-10&to=2025-03-10", x);
    let (status, body) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    let lines: LinesResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(lines.lines.len(), 1);
}
