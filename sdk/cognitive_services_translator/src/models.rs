//! Shared types and constants for the Translator services.

use cognitive_services_core::error::{CognitiveError, CognitiveResult};
use serde::Serialize;

/// API version query parameter for Translator text requests.
pub(crate) const TEXT_API_VERSION: &str = "3.0";

/// API version query parameter for document translation requests.
pub(crate) const DOCUMENT_API_VERSION: &str = "2024-05-01";

/// Maximum number of texts accepted by one text request.
pub const MAX_TEXTS_PER_REQUEST: usize = 1000;

/// One element of a Translator text request body.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct TextItem<'a> {
    #[serde(rename = "Text")]
    pub text: &'a str,
}

/// Wrap texts into a request body, rejecting empty or oversized batches.
pub(crate) fn text_items<'a>(texts: &[&'a str]) -> CognitiveResult<Vec<TextItem<'a>>> {
    if texts.is_empty() {
        return Err(CognitiveError::Builder("at least one text is required".into()));
    }
    if texts.len() > MAX_TEXTS_PER_REQUEST {
        return Err(CognitiveError::Builder(format!(
            "at most {MAX_TEXTS_PER_REQUEST} texts are allowed per request, got {}",
            texts.len()
        )));
    }
    Ok(texts.iter().map(|&text| TextItem { text }).collect())
}
