//! JIRA REST client.
//!
//! This module provides the HTTP client for the JIRA REST API v2. It handles
//! authentication, request/response processing, error extraction and retry
//! logic for idempotent requests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, redirect, Client, Method, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::auth::Auth;
use super::error::{ApiError, Result};

/// Default request timeout in seconds.
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Base delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Path prefix of the REST API.
const API_PREFIX: &str = "rest/api/2";

/// The operations the REST bridge needs from an HTTP transport.
///
/// Paths are relative to `<base_url>/rest/api/2/` and may carry a query string.
/// Empty response bodies come back as `Value::Null`.
#[async_trait]
pub trait RestTransport: Send + Sync {
    /// The normalized base URL of the JIRA instance.
    fn base_url(&self) -> &str;

    /// Attach credentials to every following request.
    fn authenticate(&mut self, auth: Auth);

    /// Whether credentials have been attached.
    fn is_authenticated(&self) -> bool;

    async fn get(&self, path: &str) -> Result<Value>;

    async fn post(&self, path: &str, body: &Value) -> Result<Value>;

    async fn put(&self, path: &str, body: &Value) -> Result<Value>;
}

/// The reqwest-backed REST transport.
#[derive(Debug)]
pub struct RestClient {
    /// The HTTP client.
    client: Client,
    /// The base URL for the JIRA instance.
    base_url: String,
    /// Authentication credentials, set at login.
    auth: Option<Auth>,
}

impl RestClient {
    /// Create an unauthenticated client for the given instance.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            base_url: normalize_base_url(base_url),
            auth: None,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_PREFIX, path.trim_start_matches('/'))
    }

    /// Perform a request, retrying transient failures of GET requests.
    #[instrument(skip(self, body), fields(method = %method, path = %path))]
    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.url(path);
        let retries = if method == Method::GET { MAX_RETRIES } else { 1 };
        let mut attempts = 0;
        let mut last_error: Option<ApiError> = None;

        while attempts < retries {
            attempts += 1;
            debug!("Request attempt {}/{}", attempts, retries);

            match self.execute(method.clone(), &url, body).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if is_retryable(&e) && attempts < retries {
                        let delay = calculate_retry_delay(attempts);
                        warn!(
                            "Request failed (attempt {}), retrying in {}ms: {}",
                            attempts, delay, e
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        last_error = Some(e);
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        Err(last_error.unwrap_or(ApiError::ServerError("Max retries exceeded".to_string())))
    }

    async fn execute(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        let mut request = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/json");

        if let Some(auth) = &self.auth {
            request = request.header(header::AUTHORIZATION, auth.header_value());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        handle_response(response).await
    }
}

#[async_trait]
impl RestTransport for RestClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authenticate(&mut self, auth: Auth) {
        self.auth = Some(auth);
    }

    fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }

    async fn get(&self, path: &str) -> Result<Value> {
        self.request(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, path, Some(body)).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::PUT, path, Some(body)).await
    }
}

/// Build the HTTP client with appropriate settings.
pub(crate) fn build_http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(ApiError::Network)
}

/// Handle the HTTP response, checking for errors and parsing JSON.
async fn handle_response(response: Response) -> Result<Value> {
    let status = response.status();
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();

    if status.is_success() {
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))
    } else {
        debug!("Error response body: {}", body);
        Err(error_from_response(status, &url, &body))
    }
}

/// Create an appropriate error from an HTTP response.
///
/// JIRA reports problems as `errorMessages` (a list) and `errors` (a map of
/// field to message); both are folded into the error text when present.
pub(crate) fn error_from_response(status: StatusCode, url: &str, body: &str) -> ApiError {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let mut messages: Vec<String> = json
            .get("errorMessages")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(errors) = json.get("errors").and_then(Value::as_object) {
            messages.extend(errors.iter().map(|(k, v)| match v.as_str() {
                Some(s) => format!("{}: {}", k, s),
                None => format!("{}: {}", k, v),
            }));
        }

        if !messages.is_empty() {
            return ApiError::from_status(status, &messages.join(", "));
        }
    }

    ApiError::from_status(status, url)
}

/// Check if an error is retryable.
fn is_retryable(error: &ApiError) -> bool {
    matches!(
        error,
        ApiError::RateLimited | ApiError::ServerError(_) | ApiError::Network(_)
    )
}

/// Calculate retry delay with exponential backoff.
fn calculate_retry_delay(attempt: u32) -> u64 {
    RETRY_DELAY_MS * 2u64.pow(attempt - 1)
}

/// Normalize the base URL by removing trailing slashes.
pub fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');

    if !url.starts_with("https://") && !url.contains("localhost") {
        warn!("URL does not use HTTPS: {}. This is insecure for production use.", url);
    }

    url.to_string()
}

/// Follow a single 301/302 redirect of the base URL, if there is one.
///
/// Any failure leaves the URL unchanged; reachability problems surface later at login.
#[instrument]
pub async fn resolve_redirect(url: &str) -> String {
    let client = match Client::builder()
        .redirect(redirect::Policy::none())
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
    {
        Ok(client) => client,
        Err(_) => return url.to_string(),
    };

    match client.get(url).send().await {
        Ok(resp)
            if matches!(
                resp.status(),
                StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND
            ) =>
        {
            match resp
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
            {
                Some(location) => {
                    debug!("Base URL redirects to {}", location);
                    location.to_string()
                }
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url_removes_trailing_slash() {
        assert_eq!(
            normalize_base_url("https://jira.example.com/"),
            "https://jira.example.com"
        );
    }

    #[test]
    fn test_normalize_base_url_handles_multiple_slashes() {
        assert_eq!(
            normalize_base_url("https://jira.example.com///"),
            "https://jira.example.com"
        );
    }

    #[test]
    fn test_normalize_base_url_preserves_path() {
        assert_eq!(
            normalize_base_url("https://example.com/jira/"),
            "https://example.com/jira"
        );
    }

    #[test]
    fn test_rest_client_url() {
        let client = RestClient::new("https://jira.example.com/").unwrap();
        assert_eq!(
            client.url("issue/TP-1"),
            "https://jira.example.com/rest/api/2/issue/TP-1"
        );
        assert_eq!(
            client.url("/priority"),
            "https://jira.example.com/rest/api/2/priority"
        );
    }

    #[test]
    fn test_rest_client_starts_unauthenticated() {
        let mut client = RestClient::new("https://jira.example.com").unwrap();
        assert!(!client.is_authenticated());
        client.authenticate(Auth::new("admin", "secret"));
        assert!(client.is_authenticated());
    }

    #[test]
    fn test_error_from_response_error_messages() {
        let body = r#"{"errorMessages":["Issue does not exist"],"errors":{}}"#;
        let err = error_from_response(StatusCode::NOT_FOUND, "http://x", body);
        match err {
            ApiError::NotFound(msg) => assert_eq!(msg, "Issue does not exist"),
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_error_from_response_field_errors() {
        let body = r#"{"errorMessages":[],"errors":{"summary":"You must specify a summary"}}"#;
        let err = error_from_response(StatusCode::BAD_REQUEST, "http://x", body);
        assert_eq!(err.to_string(), "summary: You must specify a summary");
    }

    #[test]
    fn test_error_from_response_plain_body_uses_url() {
        let err = error_from_response(StatusCode::NOT_FOUND, "http://x/rest", "<html>");
        match err {
            ApiError::NotFound(msg) => assert_eq!(msg, "http://x/rest"),
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&ApiError::RateLimited));
        assert!(is_retryable(&ApiError::ServerError("boom".to_string())));
        assert!(!is_retryable(&ApiError::Unauthorized));
        assert!(!is_retryable(&ApiError::NotFound("TP-1".to_string())));
    }

    #[test]
    fn test_retry_delay_exponential() {
        assert_eq!(calculate_retry_delay(1), 1000);
        assert_eq!(calculate_retry_delay(2), 2000);
        assert_eq!(calculate_retry_delay(3), 4000);
    }
}
