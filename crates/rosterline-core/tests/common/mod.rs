//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rosterline_core::api::{ApiClient, FnNotifier, UnauthorizedNotifier};
use rosterline_core::auth::{CredentialStore, MemoryStorage, Navigator, Route};
use rosterline_core::config::ApiConfig;
use rosterline_core::time::ManualClock;
use serde_json::{json, Value};

/// Client wired to a manual clock and a counting notifier.
pub struct Harness {
    pub client: ApiClient,
    pub credentials: Arc<CredentialStore>,
    pub clock: ManualClock,
    pub unauthorized: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new(base_url: &str) -> Self {
        Self::with_config(ApiConfig::default().with_base_url(base_url))
    }

    pub fn with_config(config: ApiConfig) -> Self {
        let clock = ManualClock::default();
        let credentials = Arc::new(CredentialStore::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(clock.clone()),
        ));
        let unauthorized = Arc::new(AtomicUsize::new(0));
        let counter = unauthorized.clone();
        let notifier: Arc<dyn UnauthorizedNotifier> = Arc::new(FnNotifier(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let client = ApiClient::new(&config, credentials.clone(), notifier).unwrap();
        Self {
            client,
            credentials,
            clock,
            unauthorized,
        }
    }

    pub fn unauthorized_count(&self) -> usize {
        self.unauthorized.load(Ordering::SeqCst)
    }
}

/// Navigator that remembers every route it was sent to.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Route> {
        self.routes().last().copied()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.routes.lock().unwrap().push(route);
    }
}

/// Base URL of a local port with nothing listening on it.
pub fn refused_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

pub fn student_json(id: i64, name: &str, grade: i32) -> Value {
    json!({
        "id": id,
        "name": name,
        "grade": grade,
        "created_at": "2024-09-01T08:00:00Z",
        "updated_at": "2024-09-01T08:00:00Z",
        "deleted_at": null
    })
}

pub fn students_json(students: &[Value]) -> Value {
    json!({ "students": students, "count": students.len() })
}

/// Poll `condition` until it holds or a second has passed.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
