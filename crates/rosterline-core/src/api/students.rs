//! Roster endpoints on top of the request pipeline.
//!
//! Reads go through the query cache; mutations invalidate it, strictly after
//! a successful response and never on failure.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{ApiClient, ApiResponse};
use crate::cache::{CacheInvalidator, QueryCache, QueryKey};
use crate::models::{
    CreateStudentRequest, HealthResponse, Student, StudentsResponse, UpdateStudentRequest,
};

pub const STUDENTS_PATH: &str = "/students";
pub const HEALTH_PATH: &str = "/health";

/// Cache key of the student list.
pub const STUDENTS_KEY: &str = "students";

#[derive(Clone)]
pub struct StudentsApi {
    client: ApiClient,
    cache: Arc<QueryCache>,
}

impl StudentsApi {
    pub fn new(client: ApiClient, cache: Arc<QueryCache>) -> Self {
        Self { client, cache }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Student list, from cache when fresh.
    pub async fn list_students(&self) -> ApiResponse<StudentsResponse> {
        let key = QueryKey::new(STUDENTS_KEY);
        if let Some(cached) = self.cache.get_fresh::<StudentsResponse>(&key) {
            debug!(cache = %key, "Serving students from cache");
            return ApiResponse::ok(200, cached);
        }
        self.refresh_students().await
    }

    /// Student list, always from the server. Caches a successful result.
    pub async fn refresh_students(&self) -> ApiResponse<StudentsResponse> {
        let response = self.client.get::<StudentsResponse>(STUDENTS_PATH).await;
        if let Some(data) = response.data() {
            self.store(&QueryKey::new(STUDENTS_KEY), data);
        }
        response
    }

    pub async fn get_student(&self, id: i64) -> ApiResponse<Student> {
        let key = QueryKey::item(STUDENTS_KEY, id);
        if let Some(cached) = self.cache.get_fresh::<Student>(&key) {
            return ApiResponse::ok(200, cached);
        }
        let response = self.client.get::<Student>(&student_path(id)).await;
        if let Some(data) = response.data() {
            self.store(&key, data);
        }
        response
    }

    pub async fn create_student(&self, request: &CreateStudentRequest) -> ApiResponse<Student> {
        let response = self.client.post::<Student, _>(STUDENTS_PATH, request).await;
        if response.success() {
            self.cache.invalidate(&QueryKey::new(STUDENTS_KEY));
        }
        response
    }

    pub async fn update_student(&self, id: i64, request: &UpdateStudentRequest) -> ApiResponse<Student> {
        let response = self.client.put::<Student, _>(&student_path(id), request).await;
        if response.success() {
            self.cache.invalidate(&QueryKey::new(STUDENTS_KEY));
        }
        response
    }

    pub async fn delete_student(&self, id: i64) -> ApiResponse<serde_json::Value> {
        let response = self.client.delete::<serde_json::Value>(&student_path(id)).await;
        if response.success() {
            self.cache.invalidate(&QueryKey::new(STUDENTS_KEY));
        }
        response
    }

    /// Service health probe. Never cached.
    pub async fn health(&self) -> ApiResponse<HealthResponse> {
        self.client.get::<HealthResponse>(HEALTH_PATH).await
    }

    fn store<T: serde::Serialize>(&self, key: &QueryKey, data: &T) {
        if let Err(e) = self.cache.put(key, data) {
            warn!(cache = %key, error = %e, "Failed to cache response");
        }
    }
}

fn student_path(id: i64) -> String {
    format!("{}/{}", STUDENTS_PATH, id)
}
