use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use super::error::ApiError;

/// Resolved result of one pipeline call.
///
/// Exactly one of `data` and `error` is present and `success` always agrees
/// with which one. Status is `0` when no response was received.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    status: u16,
    outcome: Result<T, ApiError>,
}

impl<T> ApiResponse<T> {
    pub fn ok(status: u16, data: T) -> Self {
        Self {
            status,
            outcome: Ok(data),
        }
    }

    pub fn failure(status: u16, error: ApiError) -> Self {
        Self {
            status,
            outcome: Err(error),
        }
    }

    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn data(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.outcome.as_ref().err()
    }

    /// Display message of the failure, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.error().map(|e| e.message.as_str())
    }

    pub fn into_data(self) -> Option<T> {
        self.outcome.ok()
    }

    pub fn into_result(self) -> Result<T, ApiError> {
        self.outcome
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            status: self.status,
            outcome: self.outcome.map(f),
        }
    }
}

// Wire shape: `{ success, status, data?, error? }`.
impl<T: Serialize> Serialize for ApiResponse<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ApiResponse", 3)?;
        state.serialize_field("success", &self.success())?;
        state.serialize_field("status", &self.status)?;
        match self.outcome {
            Ok(ref data) => state.serialize_field("data", data)?,
            Err(ref error) => state.serialize_field("error", error)?,
        }
        state.end()
    }
}
