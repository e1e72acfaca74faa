//! Session lifecycle: login, logout, unauthorized signals and auto-logout.
//!
//! The controller never caches "logged in" on its own. Its state is derived
//! from the credential store on every query, plus a counter of logins in
//! flight.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::CredentialStore;
use crate::api::{ApiClient, ApiError, ErrorKind, UnauthorizedSignal};
use crate::cache::QueryCache;
use crate::config::DEFAULT_EXPIRY_CHECK_SECS;
use crate::models::{LoginRequest, LoginResponse};

pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";

const LOGIN_FAILED: &str = "Login failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

/// Views the controller can send the user to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Students,
    Home,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Students => "/students",
            Route::Home => "/",
        }
    }
}

/// Where a successful login lands.
pub const DEFAULT_AUTHENTICATED_ROUTE: Route = Route::Students;

/// "Go to view X" capability supplied by the embedder.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, _route: Route) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl LoginOutcome {
    fn succeeded() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogoutReason {
    User,
    Unauthorized,
    Expired,
}

#[derive(Clone)]
pub struct SessionOptions {
    /// Period of the auto-logout expiry check.
    pub expiry_check_interval: Duration,
    /// Cleared on logout so no server data outlives the session.
    pub query_cache: Option<Arc<QueryCache>>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            expiry_check_interval: Duration::from_secs(DEFAULT_EXPIRY_CHECK_SECS),
            query_cache: None,
        }
    }
}

/// Handle to the periodic expiry check. Dropping it stops the task.
#[derive(Debug)]
pub struct AutoLogoutTimer {
    handle: JoinHandle<()>,
}

impl AutoLogoutTimer {
    fn spawn(inner: Weak<Inner>, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                if inner.credentials.is_expired() {
                    inner.end_session(LogoutReason::Expired);
                    break;
                }
            }
        });
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for AutoLogoutTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Inner {
    client: ApiClient,
    credentials: Arc<CredentialStore>,
    navigator: Arc<dyn Navigator>,
    query_cache: Option<Arc<QueryCache>>,
    check_interval: Duration,
    logins_in_flight: AtomicUsize,
    timer: Mutex<Option<AutoLogoutTimer>>,
}

impl Inner {
    fn arm_timer(self: &Arc<Self>, expiry: Option<DateTime<Utc>>) {
        let mut slot = self.timer();
        // Replacing the handle aborts any previous timer.
        *slot = None;
        if let Some(expiry) = expiry {
            debug!(%expiry, interval_secs = self.check_interval.as_secs(), "Auto-logout armed");
            *slot = Some(AutoLogoutTimer::spawn(Arc::downgrade(self), self.check_interval));
        }
    }

    fn end_session(&self, reason: LogoutReason) {
        self.credentials.clear();
        let timer = self.timer().take();
        drop(timer);
        if let Some(ref cache) = self.query_cache {
            cache.clear();
        }
        info!(reason = ?reason, "Session ended");
        self.navigator.navigate(Route::Login);
    }

    fn timer(&self) -> MutexGuard<'_, Option<AutoLogoutTimer>> {
        self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Marks a login as in flight for as long as it lives, including when the
/// login future is dropped half-way.
struct LoginInFlight<'a>(&'a AtomicUsize);

impl<'a> LoginInFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoginInFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owner of the login/logout verbs and the session's background tasks.
///
/// Background tasks hold only weak references, so dropping the controller
/// (or calling [`shutdown`](Self::shutdown)) stops them.
pub struct SessionController {
    inner: Arc<Inner>,
    listener: Option<JoinHandle<()>>,
}

impl SessionController {
    /// Resolve the initial state from the credential store and start the
    /// background tasks. No network call is made.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        client: ApiClient,
        navigator: Arc<dyn Navigator>,
        signals: UnboundedReceiver<UnauthorizedSignal>,
        options: SessionOptions,
    ) -> Self {
        let credentials = client.credentials().clone();
        let inner = Arc::new(Inner {
            client,
            credentials,
            navigator,
            query_cache: options.query_cache,
            check_interval: options.expiry_check_interval,
            logins_in_flight: AtomicUsize::new(0),
            timer: Mutex::new(None),
        });

        match inner.credentials.credential() {
            Some(credential) => {
                info!(expires_at = ?credential.expires_at, "Resuming existing session");
                inner.arm_timer(credential.expires_at);
            }
            None => debug!("No existing session"),
        }

        let listener = tokio::spawn(listen_for_unauthorized(Arc::downgrade(&inner), signals));

        Self {
            inner,
            listener: Some(listener),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.inner.logins_in_flight.load(Ordering::SeqCst) > 0 {
            SessionState::Authenticating
        } else if self.inner.credentials.get().is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.credentials.get().is_some()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.credentials.get()
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.inner.credentials.expiry()
    }

    pub fn client(&self) -> &ApiClient {
        &self.inner.client
    }

    /// True while an auto-logout timer is armed and running.
    pub fn auto_logout_armed(&self) -> bool {
        self.inner
            .timer()
            .as_ref()
            .map(|timer| !timer.is_finished())
            .unwrap_or(false)
    }

    /// Exchange credentials for a session.
    ///
    /// On success the token is stored, the auto-logout timer armed and the
    /// navigator sent to the default view. Failures only carry a message;
    /// the pipeline has already retried what it could.
    pub async fn login(&self, request: &LoginRequest) -> LoginOutcome {
        let in_flight = LoginInFlight::enter(&self.inner.logins_in_flight);
        info!(email = %request.email, "Logging in");

        let response = self.inner.client.post::<LoginResponse, _>(LOGIN_PATH, request).await;
        let login = match response.into_result() {
            Ok(login) => login,
            Err(error) => {
                drop(in_flight);
                warn!(code = %error.code, "Login failed");
                return LoginOutcome::failed(login_failure_message(&error));
            }
        };

        if login.token.is_empty() {
            drop(in_flight);
            warn!("Login response carried no token");
            return LoginOutcome::failed(LOGIN_FAILED);
        }

        let expiry = login.expiry();
        self.inner.credentials.set(login.token, expiry);
        self.inner.arm_timer(expiry);
        drop(in_flight);

        info!(expires_at = ?expiry, "Login successful");
        self.inner.navigator.navigate(DEFAULT_AUTHENTICATED_ROUTE);
        LoginOutcome::succeeded()
    }

    /// End the session locally. Safe to call in any state.
    pub fn logout(&self) {
        self.inner.end_session(LogoutReason::User);
    }

    /// Tell the server first, then end the session locally whatever it said.
    pub async fn logout_remote(&self) {
        if self.inner.credentials.get().is_some() {
            let response = self
                .inner
                .client
                .post::<serde_json::Value, _>(LOGOUT_PATH, &serde_json::json!({}))
                .await;
            if let Some(error) = response.error() {
                debug!(code = %error.code, "Server logout failed, continuing locally");
            }
        }
        self.logout();
    }

    /// Stop background tasks. Also runs on drop.
    pub fn shutdown(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        let timer = self.inner.timer().take();
        drop(timer);
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn listen_for_unauthorized(
    inner: Weak<Inner>,
    mut signals: UnboundedReceiver<UnauthorizedSignal>,
) {
    while signals.recv().await.is_some() {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.end_session(LogoutReason::Unauthorized);
    }
}

/// A rejected login means bad credentials, not an expired session, so the
/// pipeline's session-expired text is replaced by the server's message or a
/// plain "Login failed".
fn login_failure_message(error: &ApiError) -> String {
    if error.kind == ErrorKind::Auth {
        return error
            .details
            .as_ref()
            .and_then(|d| d.get("message"))
            .and_then(serde_json::Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or(LOGIN_FAILED)
            .to_string();
    }
    if error.message.is_empty() {
        LOGIN_FAILED.to_string()
    } else {
        error.message.clone()
    }
}
