//! Common test utilities
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower::util::ServiceExt;
use uuid::Uuid;

use bank_backoffice::integrations::{
    AuthProvider, IntegrationError, NewAuthUser, NewCustomer, PaymentProvider,
};
use bank_backoffice::notifications::{EmailError, EmailSender, NotificationService, OutgoingEmail};
use bank_backoffice::state::{AppState, ProvisioningSettings};

pub const ADMIN_KEY: &str = "test_key_123";
pub const READ_ONLY_KEY: &str = "test_read_456";
pub const DISABLED_KEY: &str = "test_disabled_789";

// =========================================================================
// Fakes
// =========================================================================

/// In-memory auth provider
#[derive(Default)]
pub struct FakeAuthProvider {
    pub created: Mutex<Vec<(Uuid, String)>>,
    pub deleted: Mutex<Vec<Uuid>>,
    pub fail_create: bool,
    /// Hand out this id instead of a fresh one
    pub fixed_user_id: Option<Uuid>,
}

impl FakeAuthProvider {
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    /// Returns an id that may already own a profile
    pub fn returning(user_id: Uuid) -> Self {
        Self {
            fixed_user_id: Some(user_id),
            ..Self::default()
        }
    }
}

#[async_trait]
impl AuthProvider for FakeAuthProvider {
    async fn create_user(&self, user: &NewAuthUser) -> Result<Uuid, IntegrationError> {
        if self.fail_create {
            return Err(IntegrationError::Status {
                service: "auth provider",
                status: 422,
                body: "email already registered".to_string(),
            });
        }
        let id = self.fixed_user_id.unwrap_or_else(Uuid::new_v4);
        self.created.lock().unwrap().push((id, user.email.clone()));
        Ok(id)
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), IntegrationError> {
        self.deleted.lock().unwrap().push(user_id);
        Ok(())
    }
}

/// In-memory payment provider
#[derive(Default)]
pub struct FakePaymentProvider {
    pub customers: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl PaymentProvider for FakePaymentProvider {
    async fn create_customer(&self, customer: &NewCustomer) -> Result<String, IntegrationError> {
        let id = format!("cus_{}", customer.user_id.simple());
        self.customers.lock().unwrap().push(id.clone());
        Ok(id)
    }

    async fn delete_customer(&self, customer_id: &str) -> Result<(), IntegrationError> {
        self.deleted.lock().unwrap().push(customer_id.to_string());
        Ok(())
    }
}

/// Keeps every email instead of sending it
#[derive(Default)]
pub struct RecordingEmailSender {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

impl RecordingEmailSender {
    pub fn to(&self, address: &str) -> Vec<OutgoingEmail> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.to == address)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

// =========================================================================
// State
// =========================================================================

pub struct TestContext {
    pub pool: PgPool,
    pub auth: Arc<FakeAuthProvider>,
    pub payments: Arc<FakePaymentProvider>,
    pub emails: Arc<RecordingEmailSender>,
    pub app: Router,
}

pub fn settings() -> ProvisioningSettings {
    ProvisioningSettings {
        routing_number: "021000021".to_string(),
        card_bin: "400000".to_string(),
        card_validity_years: 4,
        login_url: "http://localhost:5173/login".to_string(),
        rate_limit_per_minute: 10_000,
    }
}

pub fn build_state(
    pool: PgPool,
    auth: Arc<FakeAuthProvider>,
    payments: Arc<FakePaymentProvider>,
    emails: Arc<RecordingEmailSender>,
) -> AppState {
    AppState {
        pool,
        auth,
        payments: Some(payments),
        notifier: NotificationService::new(emails),
        settings: settings(),
    }
}

/// Router over a pool that never connects; for paths that fail before SQL
pub fn offline_app() -> Router {
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(200))
        .connect_lazy("postgres://nobody@127.0.0.1:1/none")
        .expect("lazy pool");

    bank_backoffice::build_router(build_state(
        pool,
        Arc::default(),
        Arc::default(),
        Arc::default(),
    ))
}

/// Connect to DATABASE_URL and seed the test API keys
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    let keys: [(&str, &str, Vec<&str>, bool); 3] = [
        (ADMIN_KEY, "Test Admin", vec!["admin"], true),
        (READ_ONLY_KEY, "Test Reader", vec!["read"], true),
        (DISABLED_KEY, "Test Disabled", vec!["admin"], false),
    ];

    for (key, name, permissions, is_active) in keys {
        sqlx::query(
            r#"
            INSERT INTO api_keys (name, key_hash, key_prefix, permissions, is_active)
            VALUES ($1, encode(sha256($2::bytea), 'hex'), $3, $4, $5)
            ON CONFLICT (key_prefix) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(key.as_bytes())
        .bind(&key[..9])
        .bind(permissions)
        .bind(is_active)
        .execute(&pool)
        .await
        .expect("Failed to seed API key");
    }

    pool
}

pub async fn setup() -> TestContext {
    setup_with_auth(FakeAuthProvider::default()).await
}

pub async fn setup_with_auth(auth: FakeAuthProvider) -> TestContext {
    let pool = setup_test_db().await;
    let auth = Arc::new(auth);
    let payments = Arc::new(FakePaymentProvider::default());
    let emails = Arc::new(RecordingEmailSender::default());

    let app = bank_backoffice::build_router(build_state(
        pool.clone(),
        auth.clone(),
        payments.clone(),
        emails.clone(),
    ));

    TestContext {
        pool,
        auth,
        payments,
        emails,
        app,
    }
}

/// Insert a pending application with a unique email
pub async fn seed_application(pool: &PgPool) -> (Uuid, String) {
    let email = format!("applicant-{}@example.com", Uuid::new_v4().simple());
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO applications (email, first_name, last_name, phone, city, country)
        VALUES ($1, 'Ada', 'Lovelace', '+15550100', 'London', 'GB')
        RETURNING id
        "#,
    )
    .bind(&email)
    .fetch_one(pool)
    .await
    .expect("Failed to seed application");

    (id, email)
}

// =========================================================================
// Requests
// =========================================================================

pub fn request(
    method: &str,
    uri: &str,
    api_key: &str,
    admin: Option<Uuid>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-API-Key", api_key)
        .header("content-type", "application/json");
    if let Some(admin) = admin {
        builder = builder.header("X-Admin-User-Id", admin.to_string());
    }
    let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
    builder.body(body).unwrap()
}

/// Send a request and decode the JSON body (Null when empty)
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, body)
}
