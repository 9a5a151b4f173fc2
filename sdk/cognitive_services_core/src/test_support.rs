//! Helpers for testing service crates against a `wiremock` server.

use std::time::Duration;

use wiremock::MockServer;

use crate::auth::CognitiveCredential;
use crate::client::{CognitiveClient, RetryPolicy};

/// Test subscription key (not a real key).
pub const TEST_KEY: &str = "test-subscription-key";

/// Retry policy with millisecond backoff so retry paths stay fast in tests.
pub fn fast_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        initial_backoff: Duration::from_millis(5),
    }
}

/// Create a subscription-key client connected to a mock server.
///
/// # Panics
///
/// Panics if the mock server URI is not a valid endpoint.
pub fn setup_mock_client(server: &MockServer) -> CognitiveClient {
    setup_mock_client_with(server, CognitiveCredential::subscription_key(TEST_KEY))
}

/// Create a client with a specific credential connected to a mock server.
///
/// # Panics
///
/// Panics if the mock server URI is not a valid endpoint.
pub fn setup_mock_client_with(server: &MockServer, credential: CognitiveCredential) -> CognitiveClient {
    CognitiveClient::builder()
        .endpoint(server.uri())
        .credential(credential)
        .retry_policy(fast_retry_policy())
        .build()
        .expect("should build client")
}
