//! API Routes
//!
//! HTTP endpoint definitions for the back-office API.

use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{
    AuditAction, AuditLogBuilder, AuditLogEntry, AuditLogService, ChainVerificationResult,
};
use crate::domain::account::Account;
use crate::domain::card::Card;
use crate::domain::transaction::Transaction;
use crate::domain::{
    mask_number, AccountType, AdjustmentDirection, Amount, Application, ApplicationStatus,
    CardStatus, CardType, OperationContext, Profile,
};
use crate::error::AppError;
use crate::handlers::store::{fetch_account, fetch_application, fetch_profile, Lock};
use crate::handlers::{
    AdjustTransactionCommand, AdjustTransactionHandler, AdjustmentOutcome, AdjustmentResult,
    ApprovalResult, ApproveApplicationCommand, ApproveApplicationHandler, CardStatusResult,
    CreateAccountCommand, CreateAccountHandler, CreateAccountResult, DeleteUserHandler,
    DeletionReport, IssueCardCommand, IssueCardHandler, IssueCardResult, NotificationResult,
    RejectApplicationCommand, RejectApplicationHandler, RejectionResult, SendNotificationCommand,
    SendNotificationHandler, UpdateCardStatusCommand, UpdateCardStatusHandler,
};
use crate::state::AppState;

use super::extract::{AppJson, AppPath, AppQuery};
use super::middleware::{permissions, AuthenticatedApiKey};

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
pub const IDEMPOTENT_REPLAY_HEADER: &str = "Idempotent-Replayed";

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

// =========================================================================
// Request/Response types
// =========================================================================

fn default_account_types() -> Vec<AccountType> {
    vec![AccountType::Checking, AccountType::Savings]
}

fn default_true() -> bool {
    true
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

/// Clamp a client page size into 1..=200
fn page_size(limit: i64) -> i64 {
    limit.clamp(1, MAX_PAGE_SIZE)
}

#[derive(Debug, Deserialize)]
pub struct ApproveApplicationRequest {
    #[serde(default = "default_account_types")]
    pub account_types: Vec<AccountType>,
    #[serde(default = "default_true")]
    pub issue_card: bool,
    #[serde(default)]
    pub card_type: CardType,
}

impl Default for ApproveApplicationRequest {
    fn default() -> Self {
        Self {
            account_types: default_account_types(),
            issue_card: true,
            card_type: CardType::Debit,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RejectApplicationRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationsQuery {
    #[serde(default)]
    pub status: Option<ApplicationStatus>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct ApplicationsListResponse {
    pub applications: Vec<Application>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub user_id: Uuid,
    pub account_type: AccountType,
    #[serde(default)]
    pub initial_deposit: Option<Amount>,
}

#[derive(Debug, Deserialize)]
pub struct IssueCardRequest {
    pub user_id: Uuid,
    pub account_id: Uuid,
    #[serde(default)]
    pub card_type: CardType,
    #[serde(default)]
    pub cardholder_name: Option<String>,
    #[serde(default)]
    pub spending_limit: Option<Amount>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCardStatusRequest {
    pub status: CardStatus,
}

#[derive(Debug, Deserialize)]
pub struct AdjustmentRequest {
    pub account_id: Uuid,
    pub amount: Amount,
    pub direction: AdjustmentDirection,
    pub description: String,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    pub user_id: Uuid,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub account_id: Uuid,
    pub transactions: Vec<Transaction>,
}

/// Account with the number masked
#[derive(Debug, Serialize)]
pub struct AccountView {
    pub id: Uuid,
    pub account_type: String,
    pub masked_number: String,
    pub routing_number: String,
    pub balance: Decimal,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            masked_number: account.masked_number(),
            id: account.id,
            account_type: account.account_type,
            routing_number: account.routing_number,
            balance: account.balance,
            currency: account.currency,
            status: account.status,
            created_at: account.created_at,
        }
    }
}

/// Card with the number masked; the CVV is never loaded
#[derive(Debug, Serialize)]
pub struct CardView {
    pub id: Uuid,
    pub account_id: Uuid,
    pub masked_number: String,
    pub last_four: String,
    pub cardholder_name: String,
    pub card_type: String,
    pub status: String,
    pub expiry: String,
    pub spending_limit: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl From<Card> for CardView {
    fn from(card: Card) -> Self {
        Self {
            masked_number: mask_number(&card.card_number),
            expiry: card.expiry().to_string(),
            id: card.id,
            account_id: card.account_id,
            last_four: card.last_four,
            cardholder_name: card.cardholder_name,
            card_type: card.card_type,
            status: card.status,
            spending_limit: card.spending_limit,
            created_at: card.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub profile: Profile,
    pub accounts: Vec<AccountView>,
    pub cards: Vec<CardView>,
}

#[derive(Debug, Deserialize)]
pub struct AuditLogsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub resource_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AuditLogsResponse {
    pub entries: Vec<AuditLogEntry>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Applications
        .route("/admin/applications", get(list_applications))
        .route("/admin/applications/:application_id", get(get_application))
        .route(
            "/admin/applications/:application_id/approve",
            post(approve_application),
        )
        .route(
            "/admin/applications/:application_id/reject",
            post(reject_application),
        )
        // Accounts
        .route("/admin/accounts", post(create_account))
        .route(
            "/admin/accounts/:account_id/transactions",
            get(list_account_transactions),
        )
        // Cards
        .route("/admin/cards", post(issue_card))
        .route("/admin/cards/:card_id", patch(update_card_status))
        // Adjustments
        .route("/admin/transactions/adjustments", post(adjust_transaction))
        // Users
        .route("/admin/users/:user_id", get(get_user).delete(delete_user))
        // Notifications
        .route("/admin/notifications/email", post(send_notification))
        // Audit
        .route("/admin/audit-logs", get(list_audit_logs))
        .route("/admin/audit-logs/verify", get(verify_audit_chain))
}

/// Reject the request unless the key holds `permission`; denials are audited
async fn require_permission(
    state: &AppState,
    api_key: &AuthenticatedApiKey,
    context: &OperationContext,
    permission: &str,
) -> Result<(), AppError> {
    if api_key.has_permission(permission) {
        return Ok(());
    }

    tracing::warn!(
        api_key = %api_key.name,
        permission,
        "Permission denied"
    );

    AuditLogService::new(state.pool.clone())
        .record(
            AuditLogBuilder::new(AuditAction::PermissionDenied)
                .resource("api_key", api_key.id)
                .after_state(&serde_json::json!({
                    "api_key": api_key.name,
                    "required_permission": permission,
                })),
            context,
        )
        .await;

    Err(AppError::PermissionDenied(permission.to_string()))
}

// =========================================================================
// Applications
// =========================================================================

async fn list_applications(
    State(state): State<AppState>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Extension(context): Extension<OperationContext>,
    AppQuery(query): AppQuery<ApplicationsQuery>,
) -> Result<Json<ApplicationsListResponse>, AppError> {
    require_permission(&state, &api_key, &context, permissions::READ).await?;

    let limit = page_size(query.limit);
    let offset = query.offset.max(0);
    let status = query.status.map(|s| s.as_str());

    let applications = sqlx::query_as::<_, Application>(
        r#"
        SELECT id, email, first_name, last_name, phone, date_of_birth,
               address_line1, address_line2, city, state, postal_code, country,
               status, rejection_reason, reviewed_by, reviewed_at, user_id,
               created_at, updated_at
        FROM applications
        WHERE ($1::text IS NULL OR status = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM applications WHERE ($1::text IS NULL OR status = $1)",
    )
    .bind(status)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(ApplicationsListResponse {
        applications,
        total,
        limit,
        offset,
    }))
}

async fn get_application(
    State(state): State<AppState>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Extension(context): Extension<OperationContext>,
    AppPath(application_id): AppPath<Uuid>,
) -> Result<Json<Application>, AppError> {
    require_permission(&state, &api_key, &context, permissions::READ).await?;

    let application = fetch_application(&state.pool, application_id, Lock::None).await?;
    Ok(Json(application))
}

async fn approve_application(
    State(state): State<AppState>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Extension(context): Extension<OperationContext>,
    AppPath(application_id): AppPath<Uuid>,
    body: Bytes,
) -> Result<(StatusCode, Json<ApprovalResult>), AppError> {
    require_permission(&state, &api_key, &context, permissions::APPLICATIONS_REVIEW).await?;

    let request = parse_approve_body(&body)?;
    let command = ApproveApplicationCommand::new(application_id)
        .with_account_types(request.account_types)
        .with_card(request.issue_card, request.card_type);

    let result = ApproveApplicationHandler::new(&state)
        .execute(command, &context)
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

/// The approval body is optional; an empty body means all defaults
fn parse_approve_body(body: &[u8]) -> Result<ApproveApplicationRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ApproveApplicationRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidRequest(format!("invalid approval body: {}", e)))
}

async fn reject_application(
    State(state): State<AppState>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Extension(context): Extension<OperationContext>,
    AppPath(application_id): AppPath<Uuid>,
    AppJson(request): AppJson<RejectApplicationRequest>,
) -> Result<Json<RejectionResult>, AppError> {
    require_permission(&state, &api_key, &context, permissions::APPLICATIONS_REVIEW).await?;

    let command = RejectApplicationCommand::new(application_id, request.reason);
    let result = RejectApplicationHandler::new(&state)
        .execute(command, &context)
        .await?;

    Ok(Json(result))
}

// =========================================================================
// Accounts
// =========================================================================

async fn create_account(
    State(state): State<AppState>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Extension(context): Extension<OperationContext>,
    AppJson(request): AppJson<CreateAccountRequest>,
) -> Result<(StatusCode, Json<CreateAccountResult>), AppError> {
    require_permission(&state, &api_key, &context, permissions::ACCOUNTS_WRITE).await?;

    let mut command = CreateAccountCommand::new(request.user_id, request.account_type);
    if let Some(amount) = request.initial_deposit {
        command = command.with_initial_deposit(amount);
    }

    let result = CreateAccountHandler::new(&state)
        .execute(command, &context)
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

async fn list_account_transactions(
    State(state): State<AppState>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Extension(context): Extension<OperationContext>,
    AppPath(account_id): AppPath<Uuid>,
    AppQuery(query): AppQuery<PageQuery>,
) -> Result<Json<TransactionsResponse>, AppError> {
    require_permission(&state, &api_key, &context, permissions::READ).await?;

    // 404 for unknown accounts rather than an empty list
    fetch_account(&state.pool, account_id, Lock::None).await?;

    let transactions = sqlx::query_as::<_, Transaction>(
        r#"
        SELECT id, account_id, user_id, amount, transaction_type, category,
               description, status, balance_after, reference, created_by, created_at
        FROM transactions
        WHERE account_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(account_id)
    .bind(page_size(query.limit))
    .bind(query.offset.max(0))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(TransactionsResponse {
        account_id,
        transactions,
    }))
}

// =========================================================================
// Cards
// =========================================================================

async fn issue_card(
    State(state): State<AppState>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Extension(context): Extension<OperationContext>,
    AppJson(request): AppJson<IssueCardRequest>,
) -> Result<(StatusCode, Json<IssueCardResult>), AppError> {
    require_permission(&state, &api_key, &context, permissions::CARDS_WRITE).await?;

    let mut command = IssueCardCommand::new(request.user_id, request.account_id, request.card_type);
    command.cardholder_name = request.cardholder_name;
    command.spending_limit = request.spending_limit;

    let result = IssueCardHandler::new(&state)
        .execute(command, &context)
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

async fn update_card_status(
    State(state): State<AppState>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Extension(context): Extension<OperationContext>,
    AppPath(card_id): AppPath<Uuid>,
    AppJson(request): AppJson<UpdateCardStatusRequest>,
) -> Result<Json<CardStatusResult>, AppError> {
    require_permission(&state, &api_key, &context, permissions::CARDS_WRITE).await?;

    let command = UpdateCardStatusCommand {
        card_id,
        status: request.status,
    };
    let result = UpdateCardStatusHandler::new(&state)
        .execute(command, &context)
        .await?;

    Ok(Json(result))
}

// =========================================================================
// Adjustments
// =========================================================================

/// Optional Idempotency-Key header; present but malformed is a 400
fn idempotency_key(headers: &HeaderMap) -> Result<Option<Uuid>, AppError> {
    match headers.get(IDEMPOTENCY_KEY_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(Some)
            .ok_or_else(|| {
                AppError::InvalidRequest("Idempotency-Key must be a UUID".to_string())
            }),
    }
}

async fn adjust_transaction(
    State(state): State<AppState>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Extension(context): Extension<OperationContext>,
    headers: HeaderMap,
    AppJson(request): AppJson<AdjustmentRequest>,
) -> Result<Response, AppError> {
    require_permission(&state, &api_key, &context, permissions::TRANSACTIONS_ADJUST).await?;

    let key = idempotency_key(&headers)?;

    let mut command = AdjustTransactionCommand::new(
        request.account_id,
        request.amount,
        request.direction,
        request.description,
    );
    if let Some(reference) = request.reference {
        command = command.with_reference(reference);
    }

    let outcome = AdjustTransactionHandler::new(&state)
        .execute(command, key, &context)
        .await?;

    Ok(adjustment_response(outcome))
}

fn adjustment_response(outcome: AdjustmentOutcome) -> Response {
    match outcome {
        AdjustmentOutcome::Applied(result) => {
            (StatusCode::CREATED, Json::<AdjustmentResult>(result)).into_response()
        }
        AdjustmentOutcome::Replayed { status, body } => {
            let status = u16::try_from(status)
                .ok()
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::OK);
            (status, [(IDEMPOTENT_REPLAY_HEADER, "true")], Json(body)).into_response()
        }
    }
}

// =========================================================================
// Users
// =========================================================================

async fn get_user(
    State(state): State<AppState>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Extension(context): Extension<OperationContext>,
    AppPath(user_id): AppPath<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    require_permission(&state, &api_key, &context, permissions::READ).await?;

    let profile = fetch_profile(&state.pool, user_id).await?;

    let accounts = sqlx::query_as::<_, Account>(
        r#"
        SELECT id, user_id, account_number, routing_number, account_type,
               balance, currency, status, created_at
        FROM accounts
        WHERE user_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(user_id)
    .fetch_all(&state.pool)
    .await?;

    let cards = sqlx::query_as::<_, Card>(
        r#"
        SELECT id, user_id, account_id, card_number, last_four, cardholder_name,
               expiry_month, expiry_year, card_type, status, spending_limit, created_at
        FROM cards
        WHERE user_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(UserResponse {
        profile,
        accounts: accounts.into_iter().map(AccountView::from).collect(),
        cards: cards.into_iter().map(CardView::from).collect(),
    }))
}

async fn delete_user(
    State(state): State<AppState>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Extension(context): Extension<OperationContext>,
    AppPath(user_id): AppPath<Uuid>,
) -> Result<Json<DeletionReport>, AppError> {
    require_permission(&state, &api_key, &context, permissions::USERS_DELETE).await?;

    let report = DeleteUserHandler::new(&state)
        .execute(user_id, &context)
        .await?;

    Ok(Json(report))
}

// =========================================================================
// Notifications
// =========================================================================

async fn send_notification(
    State(state): State<AppState>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Extension(context): Extension<OperationContext>,
    AppJson(request): AppJson<SendNotificationRequest>,
) -> Result<(StatusCode, Json<NotificationResult>), AppError> {
    require_permission(&state, &api_key, &context, permissions::NOTIFICATIONS_SEND).await?;

    let command = SendNotificationCommand {
        user_id: request.user_id,
        subject: request.subject,
        message: request.message,
    };
    let result = SendNotificationHandler::new(&state)
        .execute(command, &context)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(result)))
}

// =========================================================================
// Audit
// =========================================================================

async fn list_audit_logs(
    State(state): State<AppState>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Extension(context): Extension<OperationContext>,
    AppQuery(query): AppQuery<AuditLogsQuery>,
) -> Result<Json<AuditLogsResponse>, AppError> {
    require_permission(&state, &api_key, &context, permissions::AUDIT_READ).await?;

    let service = AuditLogService::new(state.pool.clone());
    let limit = page_size(query.limit);

    let entries = match (query.resource_type.as_deref(), query.resource_id) {
        (Some(resource_type), Some(resource_id)) => {
            service
                .get_by_resource(resource_type, resource_id, limit)
                .await?
        }
        (None, None) => service.get_recent(limit).await?,
        _ => {
            return Err(AppError::InvalidRequest(
                "resource_type and resource_id must be given together".to_string(),
            ))
        }
    };

    Ok(Json(AuditLogsResponse { entries }))
}

async fn verify_audit_chain(
    State(state): State<AppState>,
    Extension(api_key): Extension<AuthenticatedApiKey>,
    Extension(context): Extension<OperationContext>,
    AppQuery(query): AppQuery<VerifyQuery>,
) -> Result<Json<ChainVerificationResult>, AppError> {
    require_permission(&state, &api_key, &context, permissions::AUDIT_READ).await?;

    let result = AuditLogService::new(state.pool.clone())
        .verify_hash_chain(query.limit)
        .await?;

    if !result.is_valid {
        tracing::error!(
            first_invalid_entry = ?result.first_invalid_entry,
            "Audit hash chain verification failed"
        );
    }

    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approve_request_defaults() {
        let request: ApproveApplicationRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(
            request.account_types,
            vec![AccountType::Checking, AccountType::Savings]
        );
        assert!(request.issue_card);
        assert_eq!(request.card_type, CardType::Debit);
    }

    #[test]
    fn test_empty_approve_body_uses_defaults() {
        let request = parse_approve_body(b"").unwrap();
        assert_eq!(request.account_types.len(), 2);
        assert!(parse_approve_body(b"  \n").is_ok());
        assert!(matches!(
            parse_approve_body(br#"{"account_types": ["brokerage"]}"#),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_approve_request_overrides() {
        let request: ApproveApplicationRequest = serde_json::from_str(
            r#"{"account_types": ["savings"], "issue_card": false, "card_type": "credit"}"#,
        )
        .unwrap();
        assert_eq!(request.account_types, vec![AccountType::Savings]);
        assert!(!request.issue_card);
        assert_eq!(request.card_type, CardType::Credit);
    }

    #[test]
    fn test_adjustment_request_deserialize() {
        let json = r#"{
            "account_id": "550e8400-e29b-41d4-a716-446655440000",
            "amount": "125.50",
            "direction": "debit",
            "description": "Fee reversal"
        }"#;

        let request: AdjustmentRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.amount.to_string(), "125.50");
        assert_eq!(request.direction, AdjustmentDirection::Debit);
        assert!(request.reference.is_none());
    }

    #[test]
    fn test_adjustment_request_rejects_bad_amount() {
        let json = r#"{
            "account_id": "550e8400-e29b-41d4-a716-446655440000",
            "amount": "-5",
            "direction": "credit",
            "description": "x"
        }"#;
        assert!(serde_json::from_str::<AdjustmentRequest>(json).is_err());
    }

    #[test]
    fn test_issue_card_request_defaults() {
        let json = r#"{
            "user_id": "550e8400-e29b-41d4-a716-446655440000",
            "account_id": "6ba7b810-9dad-11d1-80b4-00c04fd430c8"
        }"#;
        let request: IssueCardRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.card_type, CardType::Debit);
        assert!(request.cardholder_name.is_none());
        assert!(request.spending_limit.is_none());
    }

    #[test]
    fn test_page_size_clamped() {
        assert_eq!(page_size(50), 50);
        assert_eq!(page_size(0), 1);
        assert_eq!(page_size(10_000), MAX_PAGE_SIZE);

        let query: ApplicationsQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(query.offset, 0);
        assert!(query.status.is_none());
    }

    #[test]
    fn test_idempotency_key_header() {
        let mut headers = HeaderMap::new();
        assert!(idempotency_key(&headers).unwrap().is_none());

        let key = Uuid::new_v4();
        headers.insert("idempotency-key", key.to_string().parse().unwrap());
        assert_eq!(idempotency_key(&headers).unwrap(), Some(key));

        headers.insert("idempotency-key", "abc".parse().unwrap());
        assert!(matches!(
            idempotency_key(&headers),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_replayed_adjustment_keeps_stored_status() {
        let response = adjustment_response(AdjustmentOutcome::Replayed {
            status: 201,
            body: serde_json::json!({ "transaction_id": Uuid::nil() }),
        });
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(IDEMPOTENT_REPLAY_HEADER).unwrap(),
            "true"
        );
    }

    #[test]
    fn test_card_view_masks_number() {
        let card = Card {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            card_number: "4000001234567899".to_string(),
            last_four: "7899".to_string(),
            cardholder_name: "ADA LOVELACE".to_string(),
            expiry_month: 11,
            expiry_year: 2029,
            card_type: "debit".to_string(),
            status: "active".to_string(),
            spending_limit: None,
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&CardView::from(card)).unwrap();
        assert!(json.contains("************7899"));
        assert!(json.contains("11/29"));
        assert!(!json.contains("4000001234567899"));
    }

    // =========================================================================
    // Request rejections
    // =========================================================================

    mod rejections {
        use std::sync::Arc;
        use std::time::Duration;

        use axum::body::{to_bytes, Body};
        use axum::http::{header, Request};
        use serde_json::{json, Value};
        use tower::util::ServiceExt;

        use super::*;
        use crate::integrations::SupabaseAuthClient;

        /// Full router with an admin key already authenticated
        fn admin_router() -> Router {
            let auth = Arc::new(SupabaseAuthClient::new(
                "http://127.0.0.1:1",
                "service-key",
                Duration::from_millis(200),
            ));
            let api_key = AuthenticatedApiKey {
                id: Uuid::new_v4(),
                name: "ops".to_string(),
                permissions: vec![permissions::ADMIN.to_string()],
            };
            let context = OperationContext::new().with_admin_user(Uuid::new_v4());

            create_router()
                .layer(Extension(api_key))
                .layer(Extension(context))
                .with_state(AppState::offline(auth))
        }

        async fn call(request: Request<Body>) -> (StatusCode, Option<String>, Value) {
            let response = admin_router().oneshot(request).await.unwrap();
            let status = response.status();
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, content_type, serde_json::from_slice(&bytes).unwrap())
        }

        fn post_json(uri: &str, body: Value) -> Request<Body> {
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        }

        fn adjustment(amount: &str, direction: &str) -> Value {
            json!({
                "account_id": Uuid::new_v4(),
                "amount": amount,
                "direction": direction,
                "description": "Goodwill credit"
            })
        }

        #[tokio::test]
        async fn test_negative_amount_is_invalid_amount() {
            let (status, content_type, body) = call(post_json(
                "/admin/transactions/adjustments",
                adjustment("-5", "credit"),
            ))
            .await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(content_type.as_deref(), Some("application/json"));
            assert_eq!(body["error_code"], "invalid_amount");
            assert!(body["details"].as_str().unwrap().contains("must be positive"));
        }

        #[tokio::test]
        async fn test_sub_cent_amount_is_invalid_amount() {
            let (status, _, body) = call(post_json(
                "/admin/transactions/adjustments",
                adjustment("1.005", "debit"),
            ))
            .await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error_code"], "invalid_amount");
        }

        #[tokio::test]
        async fn test_unknown_enum_value_is_invalid_request() {
            let (status, _, body) = call(post_json(
                "/admin/transactions/adjustments",
                adjustment("5.00", "sideways"),
            ))
            .await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error_code"], "invalid_request");
        }

        #[tokio::test]
        async fn test_missing_field_is_invalid_request() {
            let (status, _, body) = call(post_json(
                "/admin/notifications/email",
                json!({ "user_id": Uuid::new_v4(), "subject": "Hello" }),
            ))
            .await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error_code"], "invalid_request");
        }

        #[tokio::test]
        async fn test_missing_content_type_is_invalid_request() {
            let request = Request::builder()
                .method("POST")
                .uri("/admin/accounts")
                .body(Body::from(
                    json!({ "user_id": Uuid::new_v4(), "account_type": "checking" }).to_string(),
                ))
                .unwrap();

            let (status, _, body) = call(request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error_code"], "invalid_request");
        }

        #[tokio::test]
        async fn test_malformed_path_id_is_invalid_request() {
            let request = Request::builder()
                .method("PATCH")
                .uri("/admin/cards/not-a-uuid")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "status": "frozen" }).to_string()))
                .unwrap();

            let (status, _, body) = call(request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error_code"], "invalid_request");
        }

        #[tokio::test]
        async fn test_malformed_query_is_invalid_request() {
            let request = Request::builder()
                .uri("/admin/applications?limit=lots")
                .body(Body::empty())
                .unwrap();

            let (status, _, body) = call(request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error_code"], "invalid_request");
        }
    }
}
