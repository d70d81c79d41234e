//! Integration tests for login, 2FA, token refresh and logout against a
//! local mock server.

mod common;

use chrono::Duration;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use anio_cloud::adapters::ReqwestHttpClient;
use anio_cloud::api::auth::{TokenListener, TokenManager};
use anio_cloud::{
    AnioApiClient, ApiError, ClientConfig, LoginOutcome, SessionTokens,
};

use common::make_jwt;

fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig::new()
        .with_base_url(server.uri())
        .with_app_uuid("test-app-uuid")
}

fn manager_for(server: &MockServer) -> TokenManager<ReqwestHttpClient> {
    TokenManager::new(Arc::new(ReqwestHttpClient::new()), config_for(server))
}

fn manager_with_session(
    server: &MockServer,
    access_offset: Duration,
) -> TokenManager<ReqwestHttpClient> {
    manager_for(server).with_session(SessionTokens {
        access_token: make_jwt(access_offset),
        refresh_token: "refresh-token".to_string(),
    })
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_success_without_otp() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/login"))
        .and(header("client-id", "anio"))
        .and(header("app-uuid", "test-app-uuid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": make_jwt(Duration::hours(1)),
            "refreshToken": "refresh-1",
            "isOtpCodeRequired": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager_for(&server);
    let outcome = manager
        .login("parent@example.com", "secret", None)
        .await
        .unwrap();

    match outcome {
        LoginOutcome::Authenticated(pair) => {
            assert_eq!(pair.refresh_token, "refresh-1");
            assert!(pair.access_expires_at > chrono::Utc::now());
        }
        LoginOutcome::OtpRequired => panic!("expected authenticated outcome"),
    }

    let session = manager.current_session().await.unwrap();
    assert_eq!(session.refresh_token, "refresh-1");
}

#[tokio::test]
async fn test_login_invalid_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "message": "Invalid email or password",
            "error": "Unauthorized",
            "statusCode": 401
        })))
        .mount(&server)
        .await;

    let manager = manager_for(&server);
    let result = manager.login("parent@example.com", "wrong", None).await;

    assert!(matches!(result, Err(ApiError::Auth(_))));
    assert!(manager.current_session().await.is_none());
}

#[tokio::test]
async fn test_login_otp_challenge_produces_no_tokens() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "isOtpCodeRequired": true })),
        )
        .mount(&server)
        .await;

    let manager = manager_for(&server);
    let outcome = manager
        .login("parent@example.com", "secret", None)
        .await
        .unwrap();

    assert!(matches!(outcome, LoginOutcome::OtpRequired));
    assert!(manager.current_session().await.is_none());
}

#[tokio::test]
async fn test_login_with_otp_code_completes() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/login"))
        .and(body_json(serde_json::json!({
            "email": "parent@example.com",
            "password": "secret",
            "otpCode": "123456"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": make_jwt(Duration::hours(1)),
            "refreshToken": "refresh-2",
            "isOtpCodeRequired": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager_for(&server);
    let outcome = manager
        .login("parent@example.com", "secret", Some("123456"))
        .await
        .unwrap();

    assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
}

// ============================================================================
// Proactive refresh
// ============================================================================

#[tokio::test]
async fn test_token_expiring_in_four_minutes_triggers_one_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/refresh-access-token"))
        .and(header("Authorization", "Bearer refresh-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::refresh_body("refresh-token")),
        )
        .expect(1)
        .mount(&server)
        .await;

    // Inside the 5-minute proactive buffer
    let manager = manager_with_session(&server, Duration::minutes(4));
    let token = manager.ensure_valid_token().await.unwrap();

    // A second call finds the refreshed one-hour token and stays local
    let again = manager.ensure_valid_token().await.unwrap();
    assert_eq!(token, again);
}

#[tokio::test]
async fn test_token_expiring_in_six_minutes_not_refreshed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/refresh-access-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::refresh_body("refresh-token")),
        )
        .expect(0)
        .mount(&server)
        .await;

    let manager = manager_with_session(&server, Duration::minutes(6));
    let token = manager.ensure_valid_token().await.unwrap();
    assert_eq!(token, manager.current_session().await.unwrap().access_token);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/refresh-access-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::refresh_body("refresh-token"))
                .set_delay(std::time::Duration::from_millis(150)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = Arc::new(manager_with_session(&server, Duration::minutes(1)));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        tasks.push(tokio::spawn(
            async move { manager.ensure_valid_token().await },
        ));
    }

    let mut tokens = Vec::new();
    for task in tasks {
        tokens.push(task.await.unwrap().unwrap());
    }

    // Everyone got the same refreshed token
    assert!(tokens.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn test_rotated_refresh_token_captured() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/refresh-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": make_jwt(Duration::hours(1)),
            "refreshToken": "rotated-refresh"
        })))
        .mount(&server)
        .await;

    let manager = manager_with_session(&server, Duration::minutes(1));
    manager.ensure_valid_token().await.unwrap();

    let session = manager.current_session().await.unwrap();
    assert_eq!(session.refresh_token, "rotated-refresh");
}

#[tokio::test]
async fn test_refresh_keeps_old_refresh_token_when_not_rotated() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/refresh-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": make_jwt(Duration::hours(1))
        })))
        .mount(&server)
        .await;

    let manager = manager_with_session(&server, Duration::minutes(1));
    manager.ensure_valid_token().await.unwrap();

    let session = manager.current_session().await.unwrap();
    assert_eq!(session.refresh_token, "refresh-token");
}

#[tokio::test]
async fn test_dead_refresh_token_is_terminal() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/refresh-access-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "message": "Refresh token expired",
            "error": "Unauthorized",
            "statusCode": 401
        })))
        .mount(&server)
        .await;

    let manager = manager_with_session(&server, Duration::minutes(1));
    let result = manager.ensure_valid_token().await;
    assert!(matches!(result, Err(ApiError::ReauthRequired(_))));

    // The dead pair is dropped; later callers fail fast without another
    // refresh attempt
    assert!(manager.current_session().await.is_none());
    let again = manager.ensure_valid_token().await;
    assert!(matches!(again, Err(ApiError::ReauthRequired(_))));
}

#[tokio::test]
async fn test_no_session_requires_reauth() {
    let server = MockServer::start().await;
    let manager = manager_for(&server);
    let result = manager.ensure_valid_token().await;
    assert!(matches!(result, Err(ApiError::ReauthRequired(_))));
}

// ============================================================================
// Token listener
// ============================================================================

struct CountingListener {
    calls: AtomicUsize,
    last: Mutex<Option<SessionTokens>>,
}

impl TokenListener for CountingListener {
    fn on_tokens_refreshed(&self, tokens: &SessionTokens) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(tokens.clone());
    }
}

#[tokio::test]
async fn test_listener_notified_on_login_and_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            // Expires inside the buffer, so the next ensure refreshes
            "accessToken": make_jwt(Duration::minutes(2)),
            "refreshToken": "refresh-1"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/refresh-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": make_jwt(Duration::hours(1)),
            "refreshToken": "refresh-2"
        })))
        .mount(&server)
        .await;

    let listener = Arc::new(CountingListener {
        calls: AtomicUsize::new(0),
        last: Mutex::new(None),
    });
    let manager = manager_for(&server).with_listener(listener.clone());

    manager
        .login("parent@example.com", "secret", None)
        .await
        .unwrap();
    assert_eq!(listener.calls.load(Ordering::SeqCst), 1);

    manager.ensure_valid_token().await.unwrap();
    assert_eq!(listener.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        listener.last.lock().unwrap().as_ref().unwrap().refresh_token,
        "refresh-2"
    );
}

// ============================================================================
// Logout
// ============================================================================

#[tokio::test]
async fn test_logout_invalidates_remote_and_clears_local() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/logout"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager_with_session(&server, Duration::hours(1));
    manager.logout().await;
    assert!(manager.current_session().await.is_none());
}

#[tokio::test]
async fn test_logout_clears_local_state_even_when_remote_fails() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let manager = manager_with_session(&server, Duration::hours(1));
    manager.logout().await;
    assert!(manager.current_session().await.is_none());
}

// ============================================================================
// Login then fetch: the full happy path over real HTTP
// ============================================================================

#[tokio::test]
async fn test_login_then_device_list_round_trip() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "accessToken": make_jwt(Duration::hours(1)),
            "refreshToken": "refresh-1"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/device/list"))
        .and(header("app-uuid", "test-app-uuid"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([common::device_json("dev-1", "Emma", 85, 1200)])),
        )
        .mount(&server)
        .await;

    let http = Arc::new(ReqwestHttpClient::new());
    let config = config_for(&server);
    let auth = Arc::new(TokenManager::new(http.clone(), config.clone()));
    auth.login("parent@example.com", "secret", None)
        .await
        .unwrap();

    let client = AnioApiClient::new(http, &config, auth);
    let devices = client.get_devices().await.unwrap();

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].id, "dev-1");
    assert_eq!(devices[0].settings.battery, 85);
    assert_eq!(devices[0].config.max_chat_message_length, 95);
}
