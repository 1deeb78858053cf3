use api::{create_router, AppState, EngineRepositories};
use axum_test::TestServer;
use serial_test::serial;
use services::test_helpers::{
    InMemoryAuditStateRepository, InMemoryCredentialRepository, InMemoryCustomerRepository,
};
use std::sync::Arc;

fn server_from_env() -> TestServer {
    let config = config::Config::from_env();
    let state = AppState::build(
        EngineRepositories {
            customers: Arc::new(InMemoryCustomerRepository::default()),
            credentials: Arc::new(InMemoryCredentialRepository::default()),
            audit_state: Arc::new(InMemoryAuditStateRepository::default()),
        },
        &config,
    );
    TestServer::new(create_router(state)).expect("Failed to create test server")
}

#[tokio::test]
#[serial]
async fn test_admin_token_read_from_environment() {
    std::env::remove_var("ADMIN_API_TOKEN_FILE");
    std::env::set_var("ADMIN_API_TOKEN", "env-token");
    let server = server_from_env();
    std::env::remove_var("ADMIN_API_TOKEN");

    let response = server
        .post("/v1/admin/maintenance/janitor")
        .add_header(
            http::HeaderName::from_static("authorization"),
            http::HeaderValue::from_static("Bearer env-token"),
        )
        .await;
    assert_eq!(response.status_code(), 200);

    let response = server
        .post("/v1/admin/maintenance/janitor")
        .add_header(
            http::HeaderName::from_static("authorization"),
            http::HeaderValue::from_static("Bearer other-token"),
        )
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
#[serial]
async fn test_admin_token_read_from_file() {
    let path = std::env::temp_dir().join(format!("admin-token-{}", std::process::id()));
    std::fs::write(&path, "file-token\n").unwrap();
    std::env::remove_var("ADMIN_API_TOKEN");
    std::env::set_var("ADMIN_API_TOKEN_FILE", &path);
    let server = server_from_env();
    std::env::remove_var("ADMIN_API_TOKEN_FILE");
    std::fs::remove_file(&path).ok();

    let response = server
        .post("/v1/admin/maintenance/reconcile")
        .add_header(
            http::HeaderName::from_static("authorization"),
            http::HeaderValue::from_static("Bearer file-token"),
        )
        .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
#[serial]
async fn test_empty_admin_token_closes_admin_api() {
    std::env::remove_var("ADMIN_API_TOKEN_FILE");
    std::env::set_var("ADMIN_API_TOKEN", "");
    let server = server_from_env();
    std::env::remove_var("ADMIN_API_TOKEN");

    let response = server
        .post("/v1/admin/maintenance/reconcile")
        .add_header(
            http::HeaderName::from_static("authorization"),
            http::HeaderValue::from_static("Bearer "),
        )
        .await;
    assert_eq!(response.status_code(), 503);
}
