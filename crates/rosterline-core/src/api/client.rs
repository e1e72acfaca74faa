//! Request pipeline for the roster API.
//!
//! Every call goes through [`ApiClient::request`], which injects the bearer
//! token, retries transport failures with exponential backoff, classifies
//! the final response, and always resolves to an [`ApiResponse`].

use std::sync::Arc;

use reqwest::{header, Client, Method, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::error::{ApiError, ClientError};
use super::notifier::UnauthorizedNotifier;
use super::response::ApiResponse;
use super::retry::{RequestAttempt, RetryPolicy};
use crate::auth::CredentialStore;
use crate::config::ApiConfig;
use crate::time::Clock;

/// What came back from one attempt that reached the server.
struct RawResponse {
    status: u16,
    body: String,
}

/// API client for the roster service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
    notifier: Arc<dyn UnauthorizedNotifier>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl ApiClient {
    /// Build a client against `config.base_url`.
    ///
    /// Retry delays run on the credential store's clock.
    pub fn new(
        config: &ApiConfig,
        credentials: Arc<CredentialStore>,
        notifier: Arc<dyn UnauthorizedNotifier>,
    ) -> Result<Self, ClientError> {
        let base_url = normalize_base_url(&config.base_url)?;

        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        for (name, value) in &config.default_headers {
            let header_name = header::HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ClientError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            let header_value =
                header::HeaderValue::from_str(value).map_err(|e| ClientError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            headers.insert(header_name, header_value);
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()?;

        let clock = credentials.clock().clone();
        Ok(Self {
            client,
            base_url,
            credentials,
            notifier,
            retry: RetryPolicy::from_config(config),
            clock,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResponse<T> {
        self.request::<T, ()>(Method::GET, path, None).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResponse<T> {
        self.request::<T, ()>(Method::DELETE, path, None).await
    }

    /// Execute one logical call.
    ///
    /// The body is serialized once; every retry resends the same bytes.
    pub async fn request<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = match body.map(serde_json::to_vec).transpose() {
            Ok(body) => body,
            Err(e) => {
                warn!(method = %method, path, error = %e, "Failed to serialize request body");
                return ApiResponse::failure(0, ApiError::invalid_request(e));
            }
        };
        let url = self.url(path);

        let mut attempt = RequestAttempt::first();
        loop {
            match self.send_once(&method, &url, body.as_deref(), attempt).await {
                Ok(raw) => return self.resolve(&method, path, raw),
                Err(e) => {
                    if !self.retry.can_retry(&attempt) {
                        warn!(
                            method = %method,
                            path,
                            retries = attempt.retry_count,
                            error = %e,
                            "Giving up after transport failures"
                        );
                        return ApiResponse::failure(0, ApiError::network());
                    }
                    attempt = attempt.next();
                    let delay = self.retry.delay_for(attempt.retry_count);
                    warn!(
                        method = %method,
                        path,
                        retry = attempt.retry_count,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transport failure, backing off"
                    );
                    self.clock.sleep(delay).await;
                }
            }
        }
    }

    /// One attempt. `Err` means no status line arrived.
    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<&[u8]>,
        attempt: RequestAttempt,
    ) -> Result<RawResponse, reqwest::Error> {
        let mut request = self.client.request(method.clone(), url);
        // Read per attempt: a retry must not resend a token that was cleared meanwhile.
        if let Some(token) = self.credentials.get() {
            request = request.bearer_auth(token);
        }
        if let Some(bytes) = body {
            request = request.body(bytes.to_vec());
        }

        debug!(method = %method, url, retry = attempt.retry_count, "Sending request");
        let response = request.send().await?;
        let status = response.status().as_u16();
        // A status line arrived, so this is a response: a broken body is read as empty.
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(method = %method, url, status, error = %e, "Failed to read response body");
                String::new()
            }
        };
        Ok(RawResponse { status, body })
    }

    fn resolve<T: DeserializeOwned>(&self, method: &Method, path: &str, raw: RawResponse) -> ApiResponse<T> {
        let RawResponse { status, body } = raw;

        if status == 401 || status == 403 {
            info!(method = %method, path, status, "Request rejected, ending session");
            self.credentials.clear();
            self.notifier.notify();
            return ApiResponse::failure(status, ApiError::from_status(status, &body));
        }

        if (200..300).contains(&status) {
            return match decode_body(&body) {
                Ok(data) => {
                    debug!(method = %method, path, status, "Request succeeded");
                    ApiResponse::ok(status, data)
                }
                Err(e) => {
                    warn!(method = %method, path, status, error = %e, "Failed to parse response body");
                    ApiResponse::failure(status, ApiError::invalid_response(e))
                }
            };
        }

        debug!(method = %method, path, status, "Request failed");
        ApiResponse::failure(status, ApiError::from_status(status, &body))
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// An empty body decodes as JSON `null`, so `()` works for 204 responses.
fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T, serde_json::Error> {
    if body.trim().is_empty() {
        serde_json::from_value(serde_json::Value::Null)
    } else {
        serde_json::from_str(body)
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ClientError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).map_err(|e| ClientError::InvalidBaseUrl(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::InvalidBaseUrl(format!(
            "{raw}: unsupported scheme {}",
            url.scheme()
        )));
    }
    Ok(trimmed.to_string())
}
