//! Integration tests for cognitive_services_safety.
//!
//! These tests require a live Content Safety resource.
//! Run with: `cargo test --features integration-tests`
//!
//! Required environment variables:
//! - `CONTENT_SAFETY_ENDPOINT`: the resource endpoint URL
//! - `CONTENT_SAFETY_KEY`: the subscription key

#![cfg(feature = "integration-tests")]

use std::collections::BTreeMap;

use cognitive_services_core::client::CognitiveClient;
use cognitive_services_safety::content_safety::{self, Action, AnalyzeTextRequest};
use cognitive_services_safety::models::Category;

fn get_client() -> CognitiveClient {
    CognitiveClient::builder()
        .env_prefix("CONTENT_SAFETY")
        .build()
        .expect("Failed to build client")
}

#[tokio::test]
async fn test_benign_text_is_accepted() {
    let client = get_client();

    let request = AnalyzeTextRequest::builder()
        .text("The weather is lovely today.")
        .build()
        .expect("valid request");
    let analysis = content_safety::analyze_text(&client, &request)
        .await
        .expect("analyze text");
    assert_eq!(analysis.categories_analysis.len(), 4);

    let thresholds = BTreeMap::from([
        (Category::Hate, 2),
        (Category::SelfHarm, 2),
        (Category::Sexual, 2),
        (Category::Violence, 2),
    ]);
    let decision = content_safety::make_decision(&analysis, &thresholds).expect("decision");
    assert_eq!(decision.suggested_action, Action::Accept);
}
