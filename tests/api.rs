//! HTTP surface tests. The server runs over the in-memory store so no
//! database is needed.

use serde_json::{json, Value};
use std::net::TcpListener;
use std::sync::Arc;

use auth_service::auth::TokenService;
use auth_service::configuration::JwtSettings;
use auth_service::startup::run;
use auth_service::storage::InMemoryStore;

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

impl TestApp {
    async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(&format!("{}{}", &self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn register(&self, email: &str, password: &str) -> reqwest::Response {
        self.post("/auth/register", &json!({ "email": email, "password": password }))
            .await
    }
}

fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let jwt_config = JwtSettings {
        secret: "api-test-secret-with-enough-bytes".to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 604_800,
        issuer: "auth-service".to_string(),
        audience: vec!["internal".to_string()],
        storage_timeout_ms: 5_000,
    };
    let service = Arc::new(TokenService::new(Arc::new(InMemoryStore::new()), &jwt_config));

    let server = run(listener, service).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
    }
}

// --- Health ---

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app();

    let response = app
        .client
        .get(&format!("{}/health_check", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "OK");
}

// --- Registration ---

#[tokio::test]
async fn register_returns_201_with_token_pair() {
    let app = spawn_app();

    let response = app.register("john@example.com", "SecurePass1!").await;

    assert_eq!(201, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["user_id"].as_str().is_some());
    assert!(!body["access_token"].as_str().unwrap().is_empty());
    assert!(!body["refresh_token"].as_str().unwrap().is_empty());
    assert!(body["access_expires_at"].as_i64().unwrap() > chrono::Utc::now().timestamp());
}

#[tokio::test]
async fn register_returns_409_for_duplicate_email() {
    let app = spawn_app();

    app.register("john@example.com", "SecurePass1!").await;
    let response = app.register("John@Example.com", "SecurePass1!").await;

    assert_eq!(409, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "EMAIL_TAKEN");
}

#[tokio::test]
async fn register_returns_400_for_invalid_input() {
    let app = spawn_app();
    let test_cases = vec![
        ("not-an-email", "SecurePass1!", "INVALID_EMAIL"),
        ("john@example.com", "", "EMPTY_PASSWORD"),
        ("john@example.com", "weakpass", "WEAK_PASSWORD"),
    ];

    for (email, password, code) in test_cases {
        let response = app.register(email, password).await;

        assert_eq!(400, response.status().as_u16(), "case: {}", code);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], code);
    }
}

#[tokio::test]
async fn register_returns_400_for_missing_fields() {
    let app = spawn_app();

    let response = app
        .post("/auth/register", &json!({ "email": "john@example.com" }))
        .await;

    assert_eq!(400, response.status().as_u16());
}

// --- Login ---

#[tokio::test]
async fn login_returns_200_for_valid_credentials() {
    let app = spawn_app();
    app.register("jane@example.com", "SecurePass1!").await;

    let response = app
        .post(
            "/auth/login",
            &json!({ "email": "jane@example.com", "password": "SecurePass1!" }),
        )
        .await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["token_type"], "Bearer");
}

#[tokio::test]
async fn login_returns_identical_401_for_unknown_user_and_wrong_password() {
    let app = spawn_app();
    app.register("jane@example.com", "SecurePass1!").await;

    let wrong_password = app
        .post(
            "/auth/login",
            &json!({ "email": "jane@example.com", "password": "WrongPass1!" }),
        )
        .await;
    let unknown_user = app
        .post(
            "/auth/login",
            &json!({ "email": "ghost@example.com", "password": "SecurePass1!" }),
        )
        .await;

    assert_eq!(401, wrong_password.status().as_u16());
    assert_eq!(401, unknown_user.status().as_u16());

    let wrong_password: Value = wrong_password.json().await.unwrap();
    let unknown_user: Value = unknown_user.json().await.unwrap();
    assert_eq!(wrong_password["code"], unknown_user["code"]);
    assert_eq!(wrong_password["message"], unknown_user["message"]);
}

// --- Refresh and revoke ---

#[tokio::test]
async fn refresh_rotates_the_refresh_token() {
    let app = spawn_app();
    let registered: Value = app
        .register("jane@example.com", "SecurePass1!")
        .await
        .json()
        .await
        .unwrap();
    let original = registered["refresh_token"].as_str().unwrap().to_string();

    let response = app
        .post("/auth/refresh", &json!({ "refresh_token": original }))
        .await;
    assert_eq!(200, response.status().as_u16());
    let refreshed: Value = response.json().await.unwrap();
    assert_ne!(refreshed["refresh_token"], registered["refresh_token"]);
    assert_eq!(refreshed["user_id"], registered["user_id"]);

    let reused = app
        .post("/auth/refresh", &json!({ "refresh_token": original }))
        .await;
    assert_eq!(401, reused.status().as_u16());
    let reused: Value = reused.json().await.unwrap();
    assert_eq!(reused["code"], "TOKEN_REVOKED");
}

#[tokio::test]
async fn revoke_returns_204_then_401() {
    let app = spawn_app();
    let registered: Value = app
        .register("jane@example.com", "SecurePass1!")
        .await
        .json()
        .await
        .unwrap();
    let body = json!({ "refresh_token": registered["refresh_token"] });

    let first = app.post("/auth/revoke", &body).await;
    let second = app.post("/auth/revoke", &body).await;
    let unknown = app
        .post("/auth/revoke", &json!({ "refresh_token": "never-issued" }))
        .await;

    assert_eq!(204, first.status().as_u16());
    assert_eq!(401, second.status().as_u16());
    assert_eq!(401, unknown.status().as_u16());
    let unknown: Value = unknown.json().await.unwrap();
    assert_eq!(unknown["code"], "TOKEN_INVALID");
}

// --- Validate ---

#[tokio::test]
async fn validate_reports_identity_for_valid_token() {
    let app = spawn_app();
    let registered: Value = app
        .register("jane@example.com", "SecurePass1!")
        .await
        .json()
        .await
        .unwrap();

    let response = app
        .post(
            "/auth/validate",
            &json!({ "access_token": registered["access_token"] }),
        )
        .await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["valid"], true);
    assert_eq!(body["user_id"], registered["user_id"]);
    assert_eq!(body["email"], "jane@example.com");
}

#[tokio::test]
async fn validate_reports_invalid_token_as_success() {
    let app = spawn_app();

    let response = app
        .post("/auth/validate", &json!({ "access_token": "not.a.jwt" }))
        .await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["valid"], false);
    assert!(body.get("user_id").is_none());
}
