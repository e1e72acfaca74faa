//! REST API client module for the roster service.
//!
//! This module provides the `ApiClient` request pipeline (bearer token
//! injection, retry with exponential backoff, error classification), the
//! uniform `ApiResponse` outcome type, and the `StudentsApi` facade over
//! the roster endpoints.

pub mod client;
pub mod error;
pub mod notifier;
pub mod response;
pub mod retry;
pub mod students;

pub use client::ApiClient;
pub use error::{ApiError, ClientError, ErrorKind};
pub use notifier::{
    unauthorized_channel, ChannelNotifier, FnNotifier, NoopNotifier, UnauthorizedNotifier,
    UnauthorizedSignal,
};
pub use response::ApiResponse;
pub use retry::{RequestAttempt, RetryPolicy};
pub use students::StudentsApi;
