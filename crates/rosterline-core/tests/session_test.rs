//! Session controller: login, logout, unauthorized handling, auto-logout.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use common::{refused_base_url, students_json, wait_until, RecordingNavigator};
use rosterline_core::api::{unauthorized_channel, ApiClient, ApiResponse, UnauthorizedSignal};
use rosterline_core::auth::{
    CredentialStore, MemoryStorage, Route, SessionController, SessionOptions, SessionState,
};
use rosterline_core::cache::{QueryCache, QueryKey};
use rosterline_core::config::ApiConfig;
use rosterline_core::models::LoginRequest;
use rosterline_core::time::{Clock, ManualClock};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

struct Fixture {
    client: ApiClient,
    credentials: Arc<CredentialStore>,
    clock: ManualClock,
    navigator: Arc<RecordingNavigator>,
    cache: Arc<QueryCache>,
    signals: Option<UnboundedReceiver<UnauthorizedSignal>>,
}

impl Fixture {
    fn new(base_url: &str) -> Self {
        let clock = ManualClock::new(start_time());
        let credentials = Arc::new(CredentialStore::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(clock.clone()),
        ));
        let (notifier, signals) = unauthorized_channel();
        let config = ApiConfig::default().with_base_url(base_url);
        let client = ApiClient::new(&config, credentials.clone(), Arc::new(notifier)).unwrap();
        let cache = Arc::new(QueryCache::new(Arc::new(clock.clone())));
        Self {
            client,
            credentials,
            clock,
            navigator: Arc::new(RecordingNavigator::default()),
            cache,
            signals: Some(signals),
        }
    }

    fn start(&mut self) -> SessionController {
        self.start_with_interval(Duration::from_secs(60))
    }

    fn start_with_interval(&mut self, interval: Duration) -> SessionController {
        SessionController::start(
            self.client.clone(),
            self.navigator.clone(),
            self.signals.take().unwrap(),
            SessionOptions {
                expiry_check_interval: interval,
                query_cache: Some(self.cache.clone()),
            },
        )
    }
}

fn start_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-09-01T08:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn login_request() -> LoginRequest {
    LoginRequest::new("ms.lee@school.test", "hunter2")
}

#[tokio::test]
async fn successful_login_stores_token_and_navigates() {
    let server = MockServer::start().await;
    let mut fixture = Fixture::new(&server.uri());
    let expires_at = fixture.clock.now() + ChronoDuration::hours(1);

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/auth/login"))
        .and(matchers::body_json(json!({
            "email": "ms.lee@school.test",
            "password": "hunter2"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "abc",
            "expires_at": expires_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = fixture.start();
    assert_eq!(session.state(), SessionState::Unauthenticated);

    let outcome = session.login(&login_request()).await;

    assert!(outcome.success);
    assert_eq!(outcome.error, None);
    assert_eq!(session.state(), SessionState::Authenticated);
    assert_eq!(session.token().as_deref(), Some("abc"));
    assert_eq!(session.expiry(), Some(expires_at));
    assert_eq!(fixture.navigator.last(), Some(Route::Students));
    assert!(session.auto_logout_armed());
}

#[tokio::test]
async fn rejected_login_reports_server_message() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid email or password"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut fixture = Fixture::new(&server.uri());
    let session = fixture.start();
    let outcome = session.login(&login_request()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Invalid email or password"));
    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert_eq!(session.token(), None);
    assert!(!fixture.navigator.routes().contains(&Route::Students));
}

#[tokio::test]
async fn rejected_login_without_message_says_login_failed() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut fixture = Fixture::new(&server.uri());
    let session = fixture.start();
    let outcome = session.login(&login_request()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Login failed"));
}

#[tokio::test]
async fn login_validation_error_uses_server_message() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/auth/login"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "email is required"})))
        .mount(&server)
        .await;

    let mut fixture = Fixture::new(&server.uri());
    let session = fixture.start();
    let outcome = session.login(&LoginRequest::new("", "x")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("email is required"));
    assert!(fixture.navigator.routes().is_empty());
}

#[tokio::test]
async fn login_without_token_fails() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": ""})))
        .mount(&server)
        .await;

    let mut fixture = Fixture::new(&server.uri());
    let session = fixture.start();
    let outcome = session.login(&login_request()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Login failed"));
    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert!(fixture.navigator.routes().is_empty());
}

#[tokio::test]
async fn login_network_failure_reports_connection_message() {
    let mut fixture = Fixture::new(&refused_base_url());
    let session = fixture.start();

    let outcome = session.login(&login_request()).await;

    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("Network error. Please check your connection.")
    );
    assert_eq!(fixture.clock.sleeps().len(), 3);
    assert_eq!(session.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn state_is_authenticating_while_login_is_in_flight() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"token": "slow"}))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let mut fixture = Fixture::new(&server.uri());
    let session = fixture.start();

    let request = login_request();
    let (outcome, observed) = tokio::join!(
        session.login(&request),
        wait_until(|| session.state() == SessionState::Authenticating),
    );

    assert!(observed);
    assert!(outcome.success);
    assert_eq!(session.state(), SessionState::Authenticated);
    // No expiry: nothing to watch.
    assert!(!session.auto_logout_armed());
}

#[tokio::test]
async fn existing_session_is_resumed_without_network() {
    let server = MockServer::start().await;
    let mut fixture = Fixture::new(&server.uri());
    let expiry = fixture.clock.now() + ChronoDuration::minutes(30);
    fixture.credentials.set("kept", Some(expiry));

    let session = fixture.start();

    assert_eq!(session.state(), SessionState::Authenticated);
    assert_eq!(session.token().as_deref(), Some("kept"));
    assert!(session.auto_logout_armed());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn expired_session_is_not_resumed() {
    let mut fixture = Fixture::new("http://localhost:9");
    let expiry = fixture.clock.now() + ChronoDuration::minutes(5);
    fixture.credentials.set("old", Some(expiry));
    fixture.clock.advance(Duration::from_secs(6 * 60));

    let session = fixture.start();

    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert!(!session.auto_logout_armed());
}

#[tokio::test]
async fn logout_clears_everything_and_is_idempotent() {
    let mut fixture = Fixture::new("http://localhost:9");
    fixture.credentials.set("t1", Some(fixture.clock.now() + ChronoDuration::hours(1)));
    fixture
        .cache
        .put(&QueryKey::new("students"), &students_json(&[]))
        .unwrap();

    let session = fixture.start();
    assert!(session.auto_logout_armed());

    session.logout();

    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert_eq!(session.expiry(), None);
    assert!(fixture.cache.is_empty());
    assert!(!session.auto_logout_armed());
    assert_eq!(fixture.navigator.routes(), vec![Route::Login]);

    session.logout();
    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert_eq!(fixture.navigator.routes(), vec![Route::Login, Route::Login]);
}

#[tokio::test]
async fn unauthorized_response_ends_session_through_listener() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/students"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut fixture = Fixture::new(&server.uri());
    fixture.credentials.set("t1", None);
    fixture
        .cache
        .put(&QueryKey::new("students"), &students_json(&[]))
        .unwrap();
    let session = fixture.start();

    let response: ApiResponse<Value> = session.client().get("/students").await;
    assert!(!response.success());
    // The pipeline clears the store before returning.
    assert_eq!(session.state(), SessionState::Unauthenticated);

    let navigator = fixture.navigator.clone();
    assert!(wait_until(|| navigator.last() == Some(Route::Login)).await);
    assert!(fixture.cache.is_empty());
}

#[tokio::test]
async fn remote_logout_tells_server_then_clears() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/auth/logout"))
        .and(matchers::header("authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut fixture = Fixture::new(&server.uri());
    fixture.credentials.set("t1", None);
    let session = fixture.start();

    session.logout_remote().await;

    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert_eq!(fixture.navigator.last(), Some(Route::Login));
}

#[tokio::test]
async fn remote_logout_still_clears_when_server_fails() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut fixture = Fixture::new(&server.uri());
    fixture.credentials.set("t1", None);
    let session = fixture.start();

    session.logout_remote().await;

    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert_eq!(fixture.navigator.last(), Some(Route::Login));
}

#[tokio::test]
async fn remote_logout_without_session_skips_server() {
    let server = MockServer::start().await;
    let mut fixture = Fixture::new(&server.uri());
    let session = fixture.start();

    session.logout_remote().await;

    assert!(server.received_requests().await.unwrap().is_empty());
    assert_eq!(fixture.navigator.routes(), vec![Route::Login]);
}

#[tokio::test(start_paused = true)]
async fn auto_logout_fires_after_expiry() {
    let mut fixture = Fixture::new("http://localhost:9");
    let expiry = fixture.clock.now() + ChronoDuration::minutes(30);
    fixture.credentials.set("t1", Some(expiry));
    fixture
        .cache
        .put(&QueryKey::new("students"), &students_json(&[]))
        .unwrap();

    let session = fixture.start();
    assert!(session.auto_logout_armed());

    // Not yet expired: a check passes without effect.
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(session.state(), SessionState::Authenticated);
    assert!(fixture.navigator.routes().is_empty());

    fixture.clock.advance(Duration::from_secs(31 * 60));
    tokio::time::sleep(Duration::from_secs(61)).await;

    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert_eq!(fixture.navigator.routes(), vec![Route::Login]);
    assert!(fixture.cache.is_empty());
    assert!(!session.auto_logout_armed());
}

#[tokio::test(start_paused = true)]
async fn auto_logout_uses_configured_interval() {
    let mut fixture = Fixture::new("http://localhost:9");
    let expiry = fixture.clock.now() + ChronoDuration::seconds(1);
    fixture.credentials.set("t1", Some(expiry));
    fixture.clock.advance(Duration::from_secs(2));

    // The stored credential already expired, so start resolves to unauthenticated.
    let session = fixture.start_with_interval(Duration::from_secs(5));
    assert_eq!(session.state(), SessionState::Unauthenticated);

    let mut fixture = Fixture::new("http://localhost:9");
    let expiry = fixture.clock.now() + ChronoDuration::seconds(10);
    fixture.credentials.set("t2", Some(expiry));
    let session = fixture.start_with_interval(Duration::from_secs(5));

    fixture.clock.advance(Duration::from_secs(11));
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert_eq!(fixture.navigator.routes(), vec![Route::Login]);
}

#[tokio::test(start_paused = true)]
async fn dropping_controller_cancels_timer() {
    let mut fixture = Fixture::new("http://localhost:9");
    let expiry = fixture.clock.now() + ChronoDuration::minutes(1);
    fixture.credentials.set("t1", Some(expiry));

    let session = fixture.start();
    assert!(session.auto_logout_armed());
    drop(session);

    fixture.clock.advance(Duration::from_secs(5 * 60));
    tokio::time::sleep(Duration::from_secs(180)).await;

    assert!(fixture.navigator.routes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn logout_cancels_timer() {
    let mut fixture = Fixture::new("http://localhost:9");
    let expiry = fixture.clock.now() + ChronoDuration::minutes(1);
    fixture.credentials.set("t1", Some(expiry));

    let session = fixture.start();
    session.logout();
    fixture.clock.advance(Duration::from_secs(5 * 60));
    tokio::time::sleep(Duration::from_secs(180)).await;

    assert_eq!(fixture.navigator.routes(), vec![Route::Login]);
}
