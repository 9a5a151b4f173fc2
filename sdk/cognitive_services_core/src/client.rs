//! HTTP client for Azure Cognitive Services.
//!
//! This module provides [`CognitiveClient`], the transport shared by every
//! service crate. The client handles authentication headers, timeouts, retry
//! of transient failures, and error-body decoding.
//!
//! # Examples
//!
//! ## Explicit configuration
//! ```rust,no_run
//! use cognitive_services_core::client::CognitiveClient;
//! use cognitive_services_core::auth::CognitiveCredential;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CognitiveClient::builder()
//!     .endpoint("https://my-vision.cognitiveservices.azure.com")
//!     .credential(CognitiveCredential::subscription_key("your-key"))
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## From environment variables
//! ```rust,no_run
//! use cognitive_services_core::client::CognitiveClient;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Reads COMPUTER_VISION_ENDPOINT, COMPUTER_VISION_KEY and COMPUTER_VISION_REGION.
//! let client = CognitiveClient::builder()
//!     .env_prefix("COMPUTER_VISION")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::auth::CognitiveCredential;
use crate::error::{CognitiveError, CognitiveResult};
use crate::models::Page;
use bytes::Bytes;
use reqwest::{Client as HttpClient, Method};
use url::Url;

use std::time::Duration;

/// Default connection timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default read/response timeout (60 seconds).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Determines if an HTTP status code represents a retriable error.
///
/// Retriable errors are transient server-side issues that may succeed on retry:
/// - 429 Too Many Requests (rate limiting)
/// - 500 Internal Server Error
/// - 502 Bad Gateway
/// - 503 Service Unavailable
/// - 504 Gateway Timeout
#[inline]
pub fn is_retriable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Encode `key=value` pairs as a URL query string (without the leading `?`).
pub fn encode_query<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Configuration for automatic retry behavior on transient errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not counting the initial request).
    pub max_retries: u32,
    /// Initial backoff duration before the first retry.
    /// Subsequent retries use exponential backoff (2^attempt * initial_backoff).
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt + 1`, with ±25% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff * 2_u32.saturating_pow(attempt);
        let jitter = 0.75 + fastrand::f64() * 0.5;
        base.mul_f64(jitter)
    }
}

/// A file sent as one part of a `multipart/form-data` request.
#[derive(Debug, Clone)]
pub struct FilePart {
    /// Form field name (e.g. `imageData`, `document`).
    pub field: String,
    /// File name reported in the part's `Content-Disposition`.
    pub file_name: String,
    /// MIME type of the part, if known.
    pub content_type: Option<String>,
    /// Raw file content.
    pub data: Bytes,
}

impl FilePart {
    /// Create a part with no explicit content type.
    pub fn new(field: impl Into<String>, file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    /// Set the part's MIME type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    fn to_part(&self) -> CognitiveResult<reqwest::multipart::Part> {
        let part = reqwest::multipart::Part::stream_with_length(
            self.data.clone(),
            self.data.len() as u64,
        )
        .file_name(self.file_name.clone());

        match &self.content_type {
            Some(ct) => Ok(part.mime_str(ct)?),
            None => Ok(part),
        }
    }
}

/// The base client for interacting with a Cognitive Services resource.
///
/// One client targets one resource endpoint with one credential. Service
/// crates take it by reference; it is cheaply cloneable and can be shared
/// across tasks.
#[derive(Debug, Clone)]
pub struct CognitiveClient {
    pub(crate) http: HttpClient,
    pub(crate) endpoint: Url,
    pub(crate) credential: CognitiveCredential,
    pub(crate) retry_policy: RetryPolicy,
}

/// Builder for constructing a [`CognitiveClient`].
///
/// Use [`CognitiveClient::builder()`] to create a new builder.
#[derive(Debug, Default)]
pub struct CognitiveClientBuilder {
    endpoint: Option<String>,
    credential: Option<CognitiveCredential>,
    env_prefix: Option<String>,
    http_client: Option<HttpClient>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    retry_policy: Option<RetryPolicy>,
}

impl CognitiveClient {
    /// Create a new builder for configuring a `CognitiveClient`.
    pub fn builder() -> CognitiveClientBuilder {
        CognitiveClientBuilder::default()
    }

    /// Get the base endpoint URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Get the retry policy configuration.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Build a full URL for an API path (which may carry a query string).
    ///
    /// The path is appended to any path the endpoint already has, so custom
    /// domains such as `https://<name>.cognitiveservices.azure.com/translator/text/v3.0`
    /// keep their prefix. Absolute URLs (e.g. `nextLink` values) are used as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be joined to the endpoint URL.
    pub fn url(&self, path: &str) -> CognitiveResult<Url> {
        self.endpoint
            .join(path.trim_start_matches('/'))
            .map_err(|e| CognitiveError::invalid_endpoint_with_source("failed to construct URL", e))
    }

    /// Send a GET request.
    pub async fn get(&self, path: &str) -> CognitiveResult<reqwest::Response> {
        self.execute(Method::GET, path, Ok).await
    }

    /// GET a list endpoint and follow `nextLink` until every page is read.
    pub async fn get_paged<T: serde::de::DeserializeOwned>(&self, path: &str) -> CognitiveResult<Vec<T>> {
        let mut next = Some(path.to_string());
        let mut items = Vec::new();

        while let Some(path) = next {
            let page = self.get(&path).await?.json::<Page<T>>().await?;
            items.extend(page.value);
            next = page.next_link;
        }

        Ok(items)
    }

    /// Send a POST request with a JSON body.
    pub async fn post<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> CognitiveResult<reqwest::Response> {
        self.execute(Method::POST, path, |req| Ok(req.json(body)))
            .await
    }

    /// Send a POST request without a body.
    ///
    /// Several endpoints take all their parameters in the query string.
    pub async fn post_empty(&self, path: &str) -> CognitiveResult<reqwest::Response> {
        self.execute(Method::POST, path, |req| {
            Ok(req.header(reqwest::header::CONTENT_LENGTH, 0))
        })
        .await
    }

    /// Send a PUT request with a JSON body.
    pub async fn put<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> CognitiveResult<reqwest::Response> {
        self.execute(Method::PUT, path, |req| Ok(req.json(body)))
            .await
    }

    /// Send a PATCH request with a JSON body.
    pub async fn patch<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> CognitiveResult<reqwest::Response> {
        self.execute(Method::PATCH, path, |req| Ok(req.json(body)))
            .await
    }

    /// Send a DELETE request. Any 2xx status is treated as success.
    pub async fn delete(&self, path: &str) -> CognitiveResult<reqwest::Response> {
        self.execute(Method::DELETE, path, Ok).await
    }

    /// Send a POST request with a `multipart/form-data` body.
    ///
    /// The form is rebuilt from `parts` on every attempt, so retries resend
    /// the full content.
    pub async fn post_multipart(
        &self,
        path: &str,
        parts: &[FilePart],
    ) -> CognitiveResult<reqwest::Response> {
        self.execute(Method::POST, path, |req| {
            let mut form = reqwest::multipart::Form::new();
            for part in parts {
                form = form.part(part.field.clone(), part.to_part()?);
            }
            Ok(req.multipart(form))
        })
        .await
    }

    /// Send a POST request with a raw body and extra headers.
    ///
    /// Used for non-JSON payloads such as SSML. The body is cloned per
    /// attempt, which is cheap for [`Bytes`].
    pub async fn post_raw(
        &self,
        path: &str,
        content_type: &str,
        body: impl Into<Bytes>,
        headers: &[(&str, &str)],
    ) -> CognitiveResult<reqwest::Response> {
        let body = body.into();
        self.execute(Method::POST, path, |req| {
            let req = headers
                .iter()
                .fold(req, |req, (name, value)| req.header(*name, *value));
            Ok(req
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(body.clone()))
        })
        .await
    }

    /// Send a request with automatic retry on transient errors.
    ///
    /// Retries on retriable HTTP errors (429, 500, 502, 503, 504) with
    /// exponential backoff. Transport errors are returned immediately.
    async fn execute<F>(
        &self,
        method: Method,
        path: &str,
        prepare: F,
    ) -> CognitiveResult<reqwest::Response>
    where
        F: Fn(reqwest::RequestBuilder) -> CognitiveResult<reqwest::RequestBuilder>,
    {
        let url = self.url(path)?;
        let mut attempt = 0;

        loop {
            let request = self
                .credential
                .apply(self.http.request(method.clone(), url.clone()));
            let response = prepare(request)?.send().await?;

            if response.status().is_success() {
                return Ok(response);
            }

            let status = response.status().as_u16();
            if !is_retriable_status(status) || attempt >= self.retry_policy.max_retries {
                return Self::check_response(response).await;
            }

            let backoff = self.retry_policy.backoff(attempt);
            tracing::warn!(
                %method,
                status,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "transient error, retrying"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Maximum length for error messages to prevent sensitive data leaks.
    const MAX_ERROR_MESSAGE_LEN: usize = 1000;

    /// Markers after which a secret value may appear in an echoed request.
    const SECRET_MARKERS: [&'static str; 5] = [
        "Bearer ",
        "Ocp-Apim-Subscription-Key: ",
        "Ocp-Apim-Subscription-Key=",
        "Training-Key: ",
        "sig=",
    ];

    /// Replace secret values (keys, tokens, SAS signatures) with `[REDACTED]`.
    pub(crate) fn sanitize_error_message(msg: &str) -> String {
        Self::SECRET_MARKERS
            .iter()
            .fold(msg.to_string(), |acc, marker| redact_after(&acc, marker))
    }

    /// Sanitize, then truncate a message if it exceeds the maximum length.
    pub(crate) fn truncate_message(msg: &str) -> String {
        let sanitized = Self::sanitize_error_message(msg);

        if sanitized.len() > Self::MAX_ERROR_MESSAGE_LEN {
            let mut end = Self::MAX_ERROR_MESSAGE_LEN;
            while !sanitized.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated)", &sanitized[..end])
        } else {
            sanitized
        }
    }

    /// Check the response status and return an error if not successful.
    ///
    /// Cognitive Services report errors either nested
    /// (`{"error": {"code", "message"}}`) or at the top level
    /// (`{"code", "message"}`, Custom Vision).
    async fn check_response(response: reqwest::Response) -> CognitiveResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
            let (err_obj, code) = match value.get("error") {
                Some(nested) => (
                    nested,
                    nested.get("code").and_then(|c| c.as_str()).or(Some("unknown")),
                ),
                None => (&value, value.get("code").and_then(|c| c.as_str())),
            };

            if let Some(code) = code {
                return Err(CognitiveError::Api {
                    status,
                    code: code.to_string(),
                    message: Self::truncate_message(
                        err_obj
                            .get("message")
                            .and_then(|m| m.as_str())
                            .unwrap_or(&body),
                    ),
                });
            }
        }

        Err(CognitiveError::http(status, Self::truncate_message(&body)))
    }
}

fn is_secret_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '\'' | ',' | '&' | ';')
}

fn redact_after(input: &str, marker: &str) -> String {
    const REDACTED: &str = "[REDACTED]";

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find(marker) {
        let value_start = pos + marker.len();
        out.push_str(&rest[..value_start]);

        let tail = &rest[value_start..];
        let value_len = tail.find(is_secret_delimiter).unwrap_or(tail.len());
        if value_len > 0 {
            out.push_str(REDACTED);
        }
        rest = &tail[value_len..];
    }

    out.push_str(rest);
    out
}

impl CognitiveClientBuilder {
    /// Set the resource endpoint URL, e.g.
    /// `https://<resource-name>.cognitiveservices.azure.com`.
    ///
    /// If not set, the builder reads `<PREFIX>_ENDPOINT` when an
    /// [`env_prefix`](Self::env_prefix) is configured.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the credential to use for authentication.
    ///
    /// If not set, the builder uses [`CognitiveCredential::from_env`] with the
    /// configured [`env_prefix`](Self::env_prefix).
    pub fn credential(mut self, credential: CognitiveCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Set the environment variable prefix used for values not set explicitly.
    ///
    /// With prefix `TRANSLATOR_DOCUMENT` the builder falls back to
    /// `TRANSLATOR_DOCUMENT_ENDPOINT`, `TRANSLATOR_DOCUMENT_KEY` and
    /// `TRANSLATOR_DOCUMENT_REGION`.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Set a custom HTTP client.
    ///
    /// **Note:** If you provide a custom HTTP client, any timeout configuration
    /// via [`connect_timeout`](Self::connect_timeout) or
    /// [`read_timeout`](Self::read_timeout) is ignored.
    pub fn http_client(mut self, client: HttpClient) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the read timeout, covering the entire request/response cycle.
    ///
    /// Uploads of large image batches may need more than the default.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the retry policy for transient errors.
    ///
    /// Defaults to 3 retries with 500ms initial backoff.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Build the `CognitiveClient`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No endpoint is provided and none can be read from the environment
    /// - The endpoint URL is invalid
    /// - No credential is provided and none can be read from the environment
    pub fn build(self) -> CognitiveResult<CognitiveClient> {
        let http = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
                .timeout(self.read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT))
                .build()?,
        };

        let prefix = self.env_prefix.as_deref();

        let endpoint_str = self
            .endpoint
            .or_else(|| prefix.and_then(|p| std::env::var(format!("{p}_ENDPOINT")).ok()))
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                let hint = match prefix {
                    Some(p) => format!("{p}_ENDPOINT env var"),
                    None => "env_prefix".to_string(),
                };
                CognitiveError::MissingConfig(format!(
                    "endpoint is required. Set it via builder or {hint}."
                ))
            })?;

        let mut endpoint = Url::parse(&endpoint_str)
            .map_err(|e| CognitiveError::invalid_endpoint_with_source("invalid endpoint URL", e))?;

        // Relative joins replace the last segment unless the path ends in '/'.
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let credential = match (self.credential, prefix) {
            (Some(credential), _) => credential,
            (None, Some(p)) => CognitiveCredential::from_env(p)?,
            (None, None) => {
                return Err(CognitiveError::MissingConfig(
                    "credential is required. Set it via builder or env_prefix.".into(),
                ))
            }
        };

        Ok(CognitiveClient {
            http,
            endpoint,
            credential,
            retry_policy: self.retry_policy.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(10),
        }
    }

    #[test]
    fn builder_requires_endpoint() {
        let result = CognitiveClient::builder()
            .credential(CognitiveCredential::subscription_key("test"))
            .build();

        let err = result.expect_err("no endpoint");
        assert!(matches!(err, CognitiveError::MissingConfig(_)));
    }

    #[test]
    fn builder_requires_credential() {
        let result = CognitiveClient::builder()
            .endpoint("https://test.cognitiveservices.azure.com")
            .build();

        let err = result.expect_err("no credential");
        assert!(matches!(err, CognitiveError::MissingConfig(_)));
        assert!(err.to_string().contains("credential"));
    }

    #[test]
    fn builder_accepts_endpoint() {
        let client = CognitiveClient::builder()
            .endpoint("https://test.cognitiveservices.azure.com")
            .credential(CognitiveCredential::subscription_key("test"))
            .build()
            .expect("should build");

        assert_eq!(
            client.endpoint().as_str(),
            "https://test.cognitiveservices.azure.com/"
        );
    }

    #[test]
    #[serial]
    fn builder_reads_endpoint_and_key_from_env_prefix() {
        std::env::set_var("CS_CLIENT_TEST_ENDPOINT", "https://env.cognitiveservices.azure.com");
        std::env::set_var("CS_CLIENT_TEST_KEY", "env-key");

        let client = CognitiveClient::builder()
            .env_prefix("CS_CLIENT_TEST")
            .build()
            .expect("should build");

        assert_eq!(
            client.endpoint().as_str(),
            "https://env.cognitiveservices.azure.com/"
        );
        assert!(matches!(
            client.credential,
            CognitiveCredential::SubscriptionKey { .. }
        ));

        std::env::remove_var("CS_CLIENT_TEST_ENDPOINT");
        std::env::remove_var("CS_CLIENT_TEST_KEY");
    }

    #[test]
    #[serial]
    fn builder_endpoint_overrides_env() {
        std::env::set_var("CS_CLIENT_OVERRIDE_ENDPOINT", "https://env.cognitiveservices.azure.com");

        let client = CognitiveClient::builder()
            .env_prefix("CS_CLIENT_OVERRIDE")
            .endpoint("https://explicit.cognitiveservices.azure.com")
            .credential(CognitiveCredential::subscription_key("test"))
            .build()
            .expect("should build");

        assert_eq!(
            client.endpoint().as_str(),
            "https://explicit.cognitiveservices.azure.com/"
        );

        std::env::remove_var("CS_CLIENT_OVERRIDE_ENDPOINT");
    }

    #[test]
    #[serial]
    fn builder_missing_env_endpoint_names_variable() {
        std::env::remove_var("CS_CLIENT_ABSENT_ENDPOINT");

        let err = CognitiveClient::builder()
            .env_prefix("CS_CLIENT_ABSENT")
            .credential(CognitiveCredential::subscription_key("test"))
            .build()
            .expect_err("endpoint missing");

        assert!(err.to_string().contains("CS_CLIENT_ABSENT_ENDPOINT"));
    }

    #[test]
    fn builder_invalid_endpoint_url() {
        let result = CognitiveClient::builder()
            .endpoint("not a valid url")
            .credential(CognitiveCredential::subscription_key("test"))
            .build();

        assert!(matches!(
            result.unwrap_err(),
            CognitiveError::InvalidEndpoint { .. }
        ));
    }

    #[test]
    fn url_joins_path_and_query() {
        let client = CognitiveClient::builder()
            .endpoint("https://test.cognitiveservices.azure.com")
            .credential(CognitiveCredential::subscription_key("test"))
            .build()
            .expect("should build");

        let url = client
            .url("/computervision/retrieval/indexes/my-index?api-version=2023-05-01-preview")
            .expect("valid url");
        assert_eq!(url.path(), "/computervision/retrieval/indexes/my-index");
        assert_eq!(url.query(), Some("api-version=2023-05-01-preview"));
    }

    #[test]
    fn url_keeps_endpoint_path() {
        for endpoint in [
            "https://foo.cognitiveservices.azure.com/translator/text/v3.0",
            "https://foo.cognitiveservices.azure.com/translator/text/v3.0/",
        ] {
            let client = CognitiveClient::builder()
                .endpoint(endpoint)
                .credential(CognitiveCredential::subscription_key("test"))
                .build()
                .expect("should build");

            let url = client.url("/translate?api-version=3.0").expect("valid url");
            assert_eq!(
                url.as_str(),
                "https://foo.cognitiveservices.azure.com/translator/text/v3.0/translate?api-version=3.0"
            );
        }
    }

    #[test]
    fn url_accepts_absolute_next_link() {
        let client = CognitiveClient::builder()
            .endpoint("https://test.cognitiveservices.azure.com/base")
            .credential(CognitiveCredential::subscription_key("test"))
            .build()
            .expect("should build");

        let url = client
            .url("https://other.example.com/page?$skip=50")
            .expect("valid url");
        assert_eq!(url.as_str(), "https://other.example.com/page?$skip=50");
    }

    #[tokio::test]
    async fn requests_go_under_endpoint_path() {
        let server = MockServer::start().await;
        let client = CognitiveClient::builder()
            .endpoint(format!("{}/translator/text/v3.0", server.uri()))
            .credential(CognitiveCredential::subscription_key("test"))
            .retry_policy(fast_retry())
            .build()
            .expect("should build");

        Mock::given(method("GET"))
            .and(path("/translator/text/v3.0/languages"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client.get("/languages?api-version=3.0").await.expect("should succeed");
    }

    #[tokio::test]
    async fn get_paged_follows_next_link() {
        let server = MockServer::start().await;
        let client = CognitiveClient::builder()
            .endpoint(server.uri())
            .credential(CognitiveCredential::subscription_key("test"))
            .build()
            .expect("should build");

        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": ["c"]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": ["a", "b"],
                "nextLink": format!("{}/items?page=2", server.uri())
            })))
            .expect(1)
            .mount(&server)
            .await;

        let items: Vec<String> = client.get_paged("/items").await.expect("should list");
        assert_eq!(items, vec!["a", "b", "c"]);
    }

    #[test]
    fn encode_query_escapes_values() {
        let qs = encode_query([("name", "Japanese Cherry"), ("api-version", "3.0")]);
        assert_eq!(qs, "name=Japanese+Cherry&api-version=3.0");
    }

    #[test]
    fn default_retry_policy() {
        let client = CognitiveClient::builder()
            .endpoint("https://test.cognitiveservices.azure.com")
            .credential(CognitiveCredential::subscription_key("test"))
            .build()
            .expect("should build");

        assert_eq!(client.retry_policy().max_retries, 3);
        assert_eq!(
            client.retry_policy().initial_backoff,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn backoff_grows_exponentially_within_jitter() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
        };

        for attempt in 0..4 {
            let base = 100.0 * f64::from(2_u32.pow(attempt));
            let ms = policy.backoff(attempt).as_secs_f64() * 1000.0;
            assert!(ms >= base * 0.75 - 1.0 && ms <= base * 1.25 + 1.0, "attempt {attempt}: {ms}");
        }
    }

    #[test]
    fn identifies_retriable_http_errors() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retriable_status(status), "{status} should retry");
        }
        for status in [200, 201, 400, 401, 403, 404, 409] {
            assert!(!is_retriable_status(status), "{status} should not retry");
        }
    }

    // --- Wiremock integration tests ---

    async fn setup_mock_client(server: &MockServer) -> CognitiveClient {
        CognitiveClient::builder()
            .endpoint(server.uri())
            .credential(CognitiveCredential::subscription_key("test-key"))
            .retry_policy(fast_retry())
            .build()
            .expect("should build client")
    }

    #[tokio::test]
    async fn get_sends_subscription_key_header() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/test/endpoint"))
            .and(header("Ocp-Apim-Subscription-Key", "test-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let response = client.get("/test/endpoint").await.expect("should succeed");

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn region_header_is_sent_when_configured() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/languages"))
            .and(header("Ocp-Apim-Subscription-Key", "k"))
            .and(header("Ocp-Apim-Subscription-Region", "eastus"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = CognitiveClient::builder()
            .endpoint(server.uri())
            .credential(CognitiveCredential::subscription_key_with_region("k", "eastus"))
            .build()
            .expect("should build");

        client.get("/languages").await.expect("should succeed");
    }

    #[tokio::test]
    async fn training_key_header_is_sent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/customvision/v3.4-preview/training/projects"))
            .and(query_param("name", "demo"))
            .and(header("Training-Key", "train-key"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = CognitiveClient::builder()
            .endpoint(server.uri())
            .credential(CognitiveCredential::training_key("train-key"))
            .build()
            .expect("should build");

        client
            .post_empty("/customvision/v3.4-preview/training/projects?name=demo")
            .await
            .expect("should succeed");
    }

    #[tokio::test]
    async fn get_401_returns_http_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/test/endpoint"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let err = client.get("/test/endpoint").await.unwrap_err();

        match err {
            CognitiveError::Http { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Unauthorized");
            }
            other => panic!("Expected Http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nested_error_body_becomes_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/computervision/retrieval/indexes/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {"code": "NotFound", "message": "Index not found."}
            })))
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let err = client
            .get("/computervision/retrieval/indexes/missing")
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        match err {
            CognitiveError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 404);
                assert_eq!(code, "NotFound");
                assert_eq!(message, "Index not found.");
            }
            other => panic!("Expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn top_level_error_body_becomes_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/train"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": "BadRequestTrainingNotNeeded",
                "message": "Nothing changed since last training"
            })))
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let err = client.post_empty("/train").await.unwrap_err();

        assert_eq!(err.code(), Some("BadRequestTrainingNotNeeded"));
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn error_object_without_code_falls_back_to_unknown() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/test/endpoint"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"message": "bad input"}
            })))
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let err = client.get("/test/endpoint").await.unwrap_err();

        assert_eq!(err.code(), Some("unknown"));
        assert!(err.to_string().contains("bad input"));
    }

    #[tokio::test]
    async fn json_body_without_code_is_http_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/test/endpoint"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({"detail": "nope"})),
            )
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let err = client.get("/test/endpoint").await.unwrap_err();

        assert!(matches!(err, CognitiveError::Http { status: 400, .. }));
    }

    #[tokio::test]
    async fn put_and_patch_send_json() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/resource"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/resource"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let body = serde_json::json!({"name": "x"});

        assert_eq!(client.put("/resource", &body).await.unwrap().status(), 201);
        assert_eq!(client.patch("/resource", &body).await.unwrap().status(), 202);
    }

    #[tokio::test]
    async fn delete_accepts_no_content() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/resource"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let response = client.delete("/resource").await.expect("should succeed");
        assert_eq!(response.status(), 204);
    }

    #[tokio::test]
    async fn post_multipart_sends_form_data() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(move |req: &wiremock::Request| {
                let content_type = req
                    .headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let body = String::from_utf8_lossy(&req.body).to_string();
                if content_type.starts_with("multipart/form-data")
                    && body.contains("name=\"imageData\"")
                    && body.contains("filename=\"image0.jpg\"")
                    && body.contains("jpeg-bytes")
                {
                    ResponseTemplate::new(200)
                } else {
                    ResponseTemplate::new(400)
                }
            })
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let parts = [FilePart::new("imageData", "image0.jpg", &b"jpeg-bytes"[..])
            .content_type("image/jpeg")];

        let response = client
            .post_multipart("/upload", &parts)
            .await
            .expect("should succeed");
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn post_raw_sends_body_and_headers() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/synthesize"))
            .and(header("content-type", "application/ssml+xml"))
            .and(header("x-microsoft-outputformat", "riff-16khz-16bit-mono-pcm"))
            .and(wiremock::matchers::body_string("<speak>hi</speak>"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RIFF".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let response = client
            .post_raw(
                "/synthesize",
                "application/ssml+xml",
                "<speak>hi</speak>",
                &[("X-Microsoft-OutputFormat", "riff-16khz-16bit-mono-pcm")],
            )
            .await
            .expect("should succeed");
        assert_eq!(response.bytes().await.unwrap().as_ref(), b"RIFF");
    }

    #[tokio::test]
    async fn request_times_out_with_configured_timeout() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("OK")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = CognitiveClient::builder()
            .endpoint(server.uri())
            .credential(CognitiveCredential::subscription_key("test"))
            .read_timeout(Duration::from_millis(500))
            .build()
            .expect("should build");

        let start = std::time::Instant::now();
        let err = client.get("/slow").await.expect_err("should time out");

        assert!(
            matches!(err, CognitiveError::Request(_)),
            "Expected Request error from timeout, got {err:?}"
        );
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    // --- Retry logic tests ---

    #[tokio::test]
    async fn get_retries_on_503_then_succeeds() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let server = MockServer::start().await;
        let request_count = Arc::new(AtomicU32::new(0));
        let counter = request_count.clone();

        Mock::given(method("GET"))
            .and(path("/retry-test"))
            .respond_with(move |_req: &wiremock::Request| {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    ResponseTemplate::new(503).set_body_string("Service Unavailable")
                } else {
                    ResponseTemplate::new(200).set_body_string("OK")
                }
            })
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let result = client.get("/retry-test").await;

        assert!(result.is_ok(), "Expected success after retries, got {result:?}");
        assert_eq!(request_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_stop_after_max_retries() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rate-limited"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too many requests"))
            .expect(4)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let err = client
            .post("/rate-limited", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(429));
    }

    #[tokio::test]
    async fn non_retriable_error_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad"))
            .expect(1)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let _ = client.get("/bad").await;
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn retry_emits_warning() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = CognitiveClient::builder()
            .endpoint(server.uri())
            .credential(CognitiveCredential::subscription_key("test"))
            .retry_policy(RetryPolicy {
                max_retries: 1,
                initial_backoff: Duration::from_millis(1),
            })
            .build()
            .expect("should build");

        let _ = client.get("/flaky").await;
        assert!(logs_contain("transient error, retrying"));
    }

    // --- Error sanitization tests ---

    #[tokio::test]
    async fn error_sanitization_removes_sas_signature() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/translator/document/batches"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {
                    "code": "InvalidRequest",
                    "message": "Cannot access source https://acct.blob.core.windows.net/src?sv=2022&sig=abcDEF123%3D&se=2025"
                }
            })))
            .mount(&server)
            .await;

        let client = setup_mock_client(&server).await;
        let err = client
            .post("/translator/document/batches", &serde_json::json!({}))
            .await
            .unwrap_err()
            .to_string();

        assert!(!err.contains("abcDEF123"), "signature leaked: {err}");
        assert!(err.contains("sig=[REDACTED]&se=2025"), "got: {err}");
    }

    #[test]
    fn sanitization_removes_keys_and_tokens() {
        let msg = "Headers: Ocp-Apim-Subscription-Key: 0123456789abcdef, Training-Key: fedcba Bearer eyJ0eXAi.x.y";
        let result = CognitiveClient::sanitize_error_message(msg);

        assert!(!result.contains("0123456789abcdef"));
        assert!(!result.contains("fedcba"));
        assert!(!result.contains("eyJ0eXAi"));
        assert_eq!(result.matches("[REDACTED]").count(), 3);
    }

    #[test]
    fn sanitization_preserves_legitimate_errors() {
        let msg = "Index 'my-video-indexer' already exists with a different schema.";
        assert_eq!(CognitiveClient::sanitize_error_message(msg), msg);
    }

    #[test]
    fn sanitization_is_idempotent() {
        let once = CognitiveClient::sanitize_error_message("Bearer abc123");
        let twice = CognitiveClient::sanitize_error_message(&once);
        assert_eq!(once, "Bearer [REDACTED]");
        assert_eq!(twice, once);
    }

    #[test]
    fn sanitization_before_truncation() {
        let padding = "x".repeat(950);
        let msg = format!("{padding} url?sig=averyveryverylongsignaturevalue123456789");

        let result = CognitiveClient::truncate_message(&msg);
        assert!(!result.contains("averyveryverylongsignature"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let msg = "é".repeat(700);
        let result = CognitiveClient::truncate_message(&msg);
        assert!(result.ends_with("... (truncated)"));
    }
}
