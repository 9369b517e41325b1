//! API Routes
//!
//! HTTP endpoint definitions. Every route is a thin adapter over one
//! [`LedgerEngine`] operation.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AccountStatus, Currency, Direction, EntryId, EntryStatus, EntryType,
    FailureReason, HolderId, JournalEntry, JournalEntryLine, LedgerError, Money, Transfer,
    TransferId, TransferStatus,
};
use crate::error::AppError;
use crate::ledger::{LedgerEngine, LineCommand, OpenAccountCommand, PostEntryCommand, TransferCommand};
use crate::store::LedgerStore;

/// Shared router state
pub type AppState<S> = Arc<LedgerEngine<S>>;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

fn parse_currency(code: &str) -> Result<Currency, AppError> {
    Currency::new(code).map_err(|e| AppError::Ledger(LedgerError::from(e)))
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferResponse {
    pub id: Uuid,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub amount: Decimal,
    pub status: TransferStatus,
    pub failure_reason: Option<FailureReason>,
    pub journal_entry_id: Option<Uuid>,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl From<Transfer> for TransferResponse {
    fn from(transfer: Transfer) -> Self {
        Self {
            id: transfer.id.as_uuid(),
            from_account_id: transfer.from_account_id.as_uuid(),
            to_account_id: transfer.to_account_id.as_uuid(),
            amount_minor: transfer.amount_minor,
            currency: transfer.currency.to_string(),
            amount: transfer.amount().to_decimal(),
            status: transfer.status,
            failure_reason: transfer.failure_reason,
            journal_entry_id: transfer.journal_entry_id.map(|id| id.as_uuid()),
            description: transfer.description,
            idempotency_key: transfer.idempotency_key,
            requested_at: transfer.requested_at,
            executed_at: transfer.executed_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LineRequest {
    pub account_id: Uuid,
    pub direction: Direction,
    pub amount_minor: i64,
    pub currency: String,
    #[serde(default)]
    pub value_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostEntryRequest {
    pub entry_type: EntryType,
    pub lines: Vec<LineRequest>,
    #[serde(default)]
    pub booking_date: Option<NaiveDate>,
    #[serde(default)]
    pub value_date: Option<NaiveDate>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LineResponse {
    pub id: Uuid,
    pub entry_id: Uuid,
    pub account_id: Uuid,
    pub direction: Direction,
    pub amount_minor: i64,
    pub currency: String,
    pub amount: Decimal,
    pub value_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub booking_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl From<JournalEntryLine> for LineResponse {
    fn from(line: JournalEntryLine) -> Self {
        Self {
            id: line.id.as_uuid(),
            entry_id: line.entry_id.as_uuid(),
            account_id: line.account_id.as_uuid(),
            direction: line.direction,
            amount_minor: line.amount.amount_minor(),
            currency: line.amount.currency().to_string(),
            amount: line.amount.to_decimal(),
            value_date: line.value_date,
            description: line.description,
            booking_date: line.booking_date,
            created_at: line.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntryResponse {
    pub id: Uuid,
    pub entry_type: EntryType,
    pub status: EntryStatus,
    pub booking_date: NaiveDate,
    pub value_date: Option<NaiveDate>,
    pub external_reference: Option<String>,
    pub description: Option<String>,
    pub reverses: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<LineResponse>,
}

impl From<JournalEntry> for EntryResponse {
    fn from(entry: JournalEntry) -> Self {
        Self {
            id: entry.id.as_uuid(),
            entry_type: entry.entry_type,
            status: entry.status,
            booking_date: entry.booking_date,
            value_date: entry.value_date,
            external_reference: entry.external_reference,
            description: entry.description,
            reverses: entry.reverses.map(|id| id.as_uuid()),
            created_at: entry.created_at,
            lines: entry.lines.into_iter().map(LineResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenAccountRequest {
    pub holder_id: Uuid,
    pub currency: String,
    #[serde(default)]
    pub overdraft_limit_minor: i64,
    #[serde(default)]
    pub activate: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub holder_id: Uuid,
    pub currency: String,
    pub balance_minor: i64,
    pub balance: Decimal,
    pub overdraft_limit_minor: i64,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id().as_uuid(),
            holder_id: account.holder_id().as_uuid(),
            currency: account.currency().to_string(),
            balance_minor: account.balance_minor(),
            balance: account.balance().to_decimal(),
            overdraft_limit_minor: account.overdraft_limit_minor(),
            status: account.status(),
            created_at: account.created_at(),
            updated_at: account.updated_at(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: AccountStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account_id: Uuid,
    pub balance_minor: i64,
    pub currency: String,
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct LinesQuery {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LinesResponse {
    pub account_id: Uuid,
    pub lines: Vec<LineResponse>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router<S: LedgerStore>() -> Router<AppState<S>> {
    Router::new()
        // Transfers
        .route("/transfers", post(request_transfer::<S>))
        .route("/transfers/:transfer_id", get(get_transfer::<S>))
        // Journal
        .route("/journal-entries", post(post_entry::<S>))
        .route("/journal-entries/:entry_id", get(get_entry::<S>))
        .route("/journal-entries/:entry_id/reversal", post(reverse_entry::<S>))
        // Accounts
        .route("/accounts", post(open_account::<S>))
        .route("/accounts/:account_id", get(get_account::<S>))
        .route("/accounts/:account_id/status", post(change_account_status::<S>))
        .route("/accounts/:account_id/balance", get(get_balance::<S>))
        .route("/accounts/:account_id/lines", get(list_lines::<S>))
}

// =========================================================================
// POST /transfers
// =========================================================================

/// Request a transfer. FAILED transfers are a normal outcome and also return 201.
async fn request_transfer<S: LedgerStore>(
    State(engine): State<AppState<S>>,
    headers: HeaderMap,
    Json(request): Json<TransferRequest>,
) -> Result<(StatusCode, Json<TransferResponse>), AppError> {
    let idempotency_key = match headers.get(IDEMPOTENCY_KEY_HEADER) {
        Some(value) => {
            let key = value
                .to_str()
                .map_err(|_| AppError::InvalidRequest("Idempotency-Key must be ASCII".to_string()))?
                .trim();
            if key.is_empty() {
                return Err(AppError::InvalidRequest("Idempotency-Key is empty".to_string()));
            }
            Some(key.to_string())
        }
        None => None,
    };

    let currency = parse_currency(&request.currency)?;
    let mut command = TransferCommand::new(
        AccountId::from_uuid(request.from_account_id),
        AccountId::from_uuid(request.to_account_id),
        Money::new(request.amount_minor, currency),
    );
    if let Some(description) = request.description {
        command = command.with_description(description);
    }
    if let Some(key) = idempotency_key {
        command = command.with_idempotency_key(key);
    }

    let transfer = engine.request_transfer(command).await?;

    Ok((StatusCode::CREATED, Json(transfer.into())))
}

// =========================================================================
// GET /transfers/:transfer_id
// =========================================================================

async fn get_transfer<S: LedgerStore>(
    State(engine): State<AppState<S>>,
    Path(transfer_id): Path<Uuid>,
) -> Result<Json<TransferResponse>, AppError> {
    let transfer = engine.transfer(TransferId::from_uuid(transfer_id)).await?;
    Ok(Json(transfer.into()))
}

// =========================================================================
// POST /journal-entries
// =========================================================================

async fn post_entry<S: LedgerStore>(
    State(engine): State<AppState<S>>,
    Json(request): Json<PostEntryRequest>,
) -> Result<(StatusCode, Json<EntryResponse>), AppError> {
    let lines = request
        .lines
        .into_iter()
        .map(|line| {
            let currency = parse_currency(&line.currency)?;
            let mut command = LineCommand::new(
                AccountId::from_uuid(line.account_id),
                line.direction,
                Money::new(line.amount_minor, currency),
            );
            command.value_date = line.value_date;
            command.description = line.description;
            Ok(command)
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let mut command = PostEntryCommand::new(request.entry_type, lines);
    command.booking_date = request.booking_date;
    command.value_date = request.value_date;
    command.external_reference = request.external_reference;
    command.description = request.description;

    let entry = engine.post_entry(command).await?;

    Ok((StatusCode::CREATED, Json(entry.into())))
}

// =========================================================================
// GET /journal-entries/:entry_id
// =========================================================================

async fn get_entry<S: LedgerStore>(
    State(engine): State<AppState<S>>,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<EntryResponse>, AppError> {
    let entry = engine.entry(EntryId::from_uuid(entry_id)).await?;
    Ok(Json(entry.into()))
}

// =========================================================================
// POST /journal-entries/:entry_id/reversal
// =========================================================================

/// Reverse a posted entry; responds with the reversing entry
async fn reverse_entry<S: LedgerStore>(
    State(engine): State<AppState<S>>,
    Path(entry_id): Path<Uuid>,
) -> Result<(StatusCode, Json<EntryResponse>), AppError> {
    let reversal = engine.reverse_entry(EntryId::from_uuid(entry_id)).await?;
    Ok((StatusCode::CREATED, Json(reversal.into())))
}

// =========================================================================
// POST /accounts
// =========================================================================

async fn open_account<S: LedgerStore>(
    State(engine): State<AppState<S>>,
    Json(request): Json<OpenAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), AppError> {
    let currency = parse_currency(&request.currency)?;
    let mut command = OpenAccountCommand::new(HolderId::from_uuid(request.holder_id), currency)
        .with_overdraft_limit(request.overdraft_limit_minor);
    if request.activate {
        command = command.active();
    }

    let account = engine.open_account(command).await?;

    Ok((StatusCode::CREATED, Json(account.into())))
}

// =========================================================================
// GET /accounts/:account_id
// =========================================================================

async fn get_account<S: LedgerStore>(
    State(engine): State<AppState<S>>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<AccountResponse>, AppError> {
    let account = engine.account(AccountId::from_uuid(account_id)).await?;
    Ok(Json(account.into()))
}

// =========================================================================
// POST /accounts/:account_id/status
// =========================================================================

async fn change_account_status<S: LedgerStore>(
    State(engine): State<AppState<S>>,
    Path(account_id): Path<Uuid>,
    Json(request): Json<ChangeStatusRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    let account = engine
        .change_account_status(AccountId::from_uuid(account_id), request.status)
        .await?;
    Ok(Json(account.into()))
}

// =========================================================================
// GET /accounts/:account_id/balance
// =========================================================================

async fn get_balance<S: LedgerStore>(
    State(engine): State<AppState<S>>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = engine.get_balance(AccountId::from_uuid(account_id)).await?;

    Ok(Json(BalanceResponse {
        account_id,
        balance_minor: balance.amount_minor(),
        currency: balance.currency().to_string(),
        balance: balance.to_decimal(),
    }))
}

// =========================================================================
// GET /accounts/:account_id/lines
// =========================================================================

/// Account lines, most recent first, optionally bounded by booking date
async fn list_lines<S: LedgerStore>(
    State(engine): State<AppState<S>>,
    Path(account_id): Path<Uuid>,
    Query(query): Query<LinesQuery>,
) -> Result<Json<LinesResponse>, AppError> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(AppError::InvalidRequest(format!(
                "from ({from}) is after to ({to})"
            )));
        }
    }

    let lines = engine
        .list_lines(AccountId::from_uuid(account_id), query.from, query.to)
        .await?;

    Ok(Json(LinesResponse {
        account_id,
        lines: lines.into_iter().map(LineResponse::from).collect(),
    }))
}
