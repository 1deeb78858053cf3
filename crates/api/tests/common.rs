#![allow(dead_code)]

use api::{create_router, AppState, EngineRepositories};
use axum_test::{TestResponse, TestServer};
use chrono::{DateTime, Duration, Utc};
use services::{
    customer::Customer,
    subscription::SubscriptionRecord,
    test_helpers::{
        InMemoryAuditStateRepository, InMemoryCredentialRepository, InMemoryCustomerRepository,
    },
};
use std::sync::Arc;

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Test server over the in-memory fakes, with handles to seed and inspect them
pub struct TestEngine {
    pub server: TestServer,
    pub state: AppState,
    pub customers: Arc<InMemoryCustomerRepository>,
    pub credentials: Arc<InMemoryCredentialRepository>,
    pub audit: Arc<InMemoryAuditStateRepository>,
}

/// Engine settings pinned so tests do not depend on the environment
pub fn test_config(admin_token: Option<&str>) -> config::Config {
    let mut config = config::Config::default();
    config.admin.api_token = admin_token.map(str::to_string);
    config.engine.grace_days = 3;
    config.engine.janitor_buffer_days = 5;
    config.engine.default_duration_months = 1;
    config.engine.demo_email_marker = "demo".to_string();
    config.engine.reconcile_interval_secs = 0;
    config.engine.cache_ttl_secs = 0;
    config.pool.expiry_thresholds = vec![
        ("viki".to_string(), 30),
        ("netflix".to_string(), 25),
        ("disney".to_string(), 14),
    ];
    config.pool.default_expiry_days = 30;
    config.pool.capacity_limits = Vec::new();
    config.pool.default_capacity = Some(5);
    config
}

pub fn create_test_engine() -> TestEngine {
    create_test_engine_with_config(test_config(Some(ADMIN_TOKEN)))
}

pub fn create_test_engine_with_config(config: config::Config) -> TestEngine {
    let customers = Arc::new(InMemoryCustomerRepository::default());
    let credentials = Arc::new(InMemoryCredentialRepository::default());
    let audit = Arc::new(InMemoryAuditStateRepository::default());

    let state = AppState::build(
        EngineRepositories {
            customers: customers.clone(),
            credentials: credentials.clone(),
            audit_state: audit.clone(),
        },
        &config,
    );
    let server =
        TestServer::new(create_router(state.clone())).expect("Failed to create test server");

    TestEngine {
        server,
        state,
        customers,
        credentials,
        audit,
    }
}

pub fn auth_header() -> (http::HeaderName, http::HeaderValue) {
    (
        http::HeaderName::from_static("authorization"),
        http::HeaderValue::from_str(&format!("Bearer {ADMIN_TOKEN}")).unwrap(),
    )
}

/// Customer with one paid subscription per `(service, start)` pair
pub fn customer_with(phone: &str, subscriptions: &[(&str, DateTime<Utc>)]) -> Customer {
    let mut customer = Customer::new(phone, format!("Customer {phone}"));
    for (service, start) in subscriptions {
        customer
            .subscriptions
            .push(SubscriptionRecord::new(*service, *start, 1));
    }
    customer
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

impl TestEngine {
    pub async fn get(&self, path: &str) -> TestResponse {
        let (name, value) = auth_header();
        self.server.get(path).add_header(name, value).await
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> TestResponse {
        let (name, value) = auth_header();
        self.server.post(path).add_header(name, value).json(&body).await
    }

    pub async fn put(&self, path: &str, body: serde_json::Value) -> TestResponse {
        let (name, value) = auth_header();
        self.server.put(path).add_header(name, value).json(&body).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        let (name, value) = auth_header();
        self.server.delete(path).add_header(name, value).await
    }

    /// Publish through the API so reconciliation runs, returning the credential JSON
    pub async fn publish(&self, service: &str, email: &str) -> serde_json::Value {
        let response = self
            .post(
                "/v1/admin/credentials",
                serde_json::json!({
                    "service": service,
                    "secret_email": email,
                    "secret_password": "initial-secret",
                }),
            )
            .await;
        assert_eq!(response.status_code(), 201, "publish should succeed");
        response.json()
    }

    pub async fn assignments(&self, customer: &Customer) -> serde_json::Value {
        let response = self
            .get(&format!("/v1/admin/customers/{}/assignments", customer.id))
            .await;
        assert_eq!(response.status_code(), 200);
        response.json()
    }
}
