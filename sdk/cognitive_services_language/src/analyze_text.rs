//! Synchronous text analysis with the Language `:analyze-text` endpoint.
//!
//! One request runs one analysis [`Kind`] over a small batch of documents.
//! Per-document failures are reported in [`TaskResults::errors`] while the
//! call itself succeeds.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cognitive_services_core::client::CognitiveClient;
//! use cognitive_services_language::analyze_text::{self, AnalyzeTextRequest, Kind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CognitiveClient::builder().env_prefix("LANGUAGE").build()?;
//!
//! let request = AnalyzeTextRequest::builder(Kind::SentimentAnalysis)
//!     .document("1", "The rooms were spotless and the staff friendly.")
//!     .document_in("2", "es", "La comida estaba fría.")
//!     .parameter("opinionMining", true)
//!     .build()?;
//! let result = analyze_text::analyze_text(&client, &request).await?;
//! for doc in &result.results.documents {
//!     println!("{}: {:?}", doc.id, doc.sentiment);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;

use cognitive_services_core::client::{encode_query, CognitiveClient};
use cognitive_services_core::error::{CognitiveError, CognitiveResult};
use cognitive_services_core::models::InnerError;
use serde::{Deserialize, Serialize};

/// API version of `:analyze-text` requests.
pub const API_VERSION: &str = "2023-04-01";

/// Maximum length of one document, in characters.
pub const MAX_DOCUMENT_LENGTH: usize = 5_120;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Analysis to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    SentimentAnalysis,
    EntityRecognition,
    PiiEntityRecognition,
    KeyPhraseExtraction,
    LanguageDetection,
    EntityLinking,
}

impl Kind {
    /// Largest batch the synchronous endpoint accepts for this kind.
    pub fn max_documents(self) -> usize {
        match self {
            Self::LanguageDetection => 1000,
            Self::SentimentAnalysis | Self::KeyPhraseExtraction => 10,
            Self::EntityRecognition | Self::PiiEntityRecognition | Self::EntityLinking => 5,
        }
    }
}

/// One input document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocument {
    pub id: String,
    /// ISO 639-1 language. Ignored for language detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Two-letter country hint, used by language detection only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_hint: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
struct AnalysisInput {
    documents: Vec<TextDocument>,
}

/// Body of [`analyze_text`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeTextRequest {
    kind: Kind,
    analysis_input: AnalysisInput,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    parameters: serde_json::Map<String, serde_json::Value>,
}

impl AnalyzeTextRequest {
    pub fn builder(kind: Kind) -> AnalyzeTextRequestBuilder {
        AnalyzeTextRequestBuilder {
            kind,
            documents: Vec::new(),
            parameters: serde_json::Map::new(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn documents(&self) -> &[TextDocument] {
        &self.analysis_input.documents
    }
}

/// Builder for [`AnalyzeTextRequest`].
#[derive(Debug)]
pub struct AnalyzeTextRequestBuilder {
    kind: Kind,
    documents: Vec<TextDocument>,
    parameters: serde_json::Map<String, serde_json::Value>,
}

impl AnalyzeTextRequestBuilder {
    /// Adds a document without a language hint.
    pub fn document(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.documents.push(TextDocument {
            id: id.into(),
            language: None,
            country_hint: None,
            text: text.into(),
        });
        self
    }

    /// Adds a document in a known language.
    pub fn document_in(
        mut self,
        id: impl Into<String>,
        language: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.documents.push(TextDocument {
            id: id.into(),
            language: Some(language.into()),
            country_hint: None,
            text: text.into(),
        });
        self
    }

    pub fn push(mut self, document: TextDocument) -> Self {
        self.documents.push(document);
        self
    }

    /// Sets a task parameter such as `modelVersion`, `opinionMining` or
    /// `piiCategories`.
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns [`CognitiveError::Builder`] if:
    /// - there are no documents, or more than [`Kind::max_documents`]
    /// - a document id is empty or repeated
    /// - a document is empty or longer than [`MAX_DOCUMENT_LENGTH`] characters
    pub fn build(self) -> CognitiveResult<AnalyzeTextRequest> {
        if self.documents.is_empty() {
            return Err(CognitiveError::Builder("at least one document is required".into()));
        }
        let max = self.kind.max_documents();
        if self.documents.len() > max {
            return Err(CognitiveError::Builder(format!(
                "{:?} accepts at most {max} documents (got {})",
                self.kind,
                self.documents.len()
            )));
        }

        let mut seen = HashSet::new();
        for doc in &self.documents {
            if doc.id.is_empty() {
                return Err(CognitiveError::Builder("document id cannot be empty".into()));
            }
            if !seen.insert(doc.id.as_str()) {
                return Err(CognitiveError::Builder(format!(
                    "duplicate document id \"{}\"",
                    doc.id
                )));
            }
            if doc.text.trim().is_empty() {
                return Err(CognitiveError::Builder(format!(
                    "document \"{}\" has no text",
                    doc.id
                )));
            }
            let len = doc.text.chars().count();
            if len > MAX_DOCUMENT_LENGTH {
                return Err(CognitiveError::Builder(format!(
                    "document \"{}\" exceeds {MAX_DOCUMENT_LENGTH} characters (got {len})",
                    doc.id
                )));
            }
        }

        Ok(AnalyzeTextRequest {
            kind: self.kind,
            analysis_input: AnalysisInput {
                documents: self.documents,
            },
            parameters: self.parameters,
        })
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ConfidenceScores {
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceSentiment {
    pub text: String,
    pub sentiment: Sentiment,
    pub confidence_scores: ConfidenceScores,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub length: usize,
}

/// A recognized, PII or linked entity.
///
/// Linked entities carry `name`, `url` and `data_source`. Recognized entities
/// carry `text` and `category`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub length: usize,
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub data_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedLanguage {
    pub name: String,
    pub iso6391_name: String,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Warning {
    pub code: String,
    pub message: String,
}

/// Result for one input document. Fields not produced by the task kind stay
/// empty.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResult {
    pub id: String,
    #[serde(default)]
    pub warnings: Vec<Warning>,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub confidence_scores: Option<ConfidenceScores>,
    #[serde(default)]
    pub sentences: Vec<SentenceSentiment>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub key_phrases: Vec<String>,
    #[serde(default)]
    pub detected_language: Option<DetectedLanguage>,
    #[serde(default)]
    pub redacted_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentError {
    pub id: String,
    pub error: InnerError,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResults {
    #[serde(default)]
    pub documents: Vec<DocumentResult>,
    #[serde(default)]
    pub errors: Vec<DocumentError>,
    #[serde(default)]
    pub model_version: Option<String>,
}

/// Result of [`analyze_text`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalyzeTextResult {
    /// Result kind, e.g. `SentimentAnalysisResults`.
    pub kind: String,
    pub results: TaskResults,
}

impl AnalyzeTextResult {
    pub fn document(&self, id: &str) -> Option<&DocumentResult> {
        self.results.documents.iter().find(|d| d.id == id)
    }

    pub fn error(&self, id: &str) -> Option<&InnerError> {
        self.results
            .errors
            .iter()
            .find(|e| e.id == id)
            .map(|e| &e.error)
    }
}

// ---------------------------------------------------------------------------
// API
// ---------------------------------------------------------------------------

/// Run a synchronous text analysis task.
///
/// # Tracing
///
/// Emits a span named `cognitive::language::analyze_text` with fields `kind`
/// and `documents`.
#[tracing::instrument(
    name = "cognitive::language::analyze_text",
    skip(client, request),
    fields(kind = ?request.kind(), documents = request.documents().len())
)]
pub async fn analyze_text(
    client: &CognitiveClient,
    request: &AnalyzeTextRequest,
) -> CognitiveResult<AnalyzeTextResult> {
    tracing::debug!("analyzing text");

    let path = format!(
        "/language/:analyze-text?{}",
        encode_query([("api-version", API_VERSION)])
    );
    let response = client.post(&path, request).await?;
    let result = response.json::<AnalyzeTextResult>().await?;

    if !result.results.errors.is_empty() {
        tracing::warn!(failed = result.results.errors.len(), "some documents failed");
    }
    tracing::debug!(documents = result.results.documents.len(), "text analyzed");
    Ok(result)
}

/// Detect the language of each text. Results keep the input order; ids are
/// the input positions.
///
/// # Errors
///
/// Returns [`CognitiveError::OperationFailed`] if the service rejects one of
/// the documents.
#[tracing::instrument(name = "cognitive::language::detect_language", skip(client, texts))]
pub async fn detect_language(
    client: &CognitiveClient,
    texts: &[&str],
) -> CognitiveResult<Vec<DetectedLanguage>> {
    let request = texts
        .iter()
        .enumerate()
        .fold(AnalyzeTextRequest::builder(Kind::LanguageDetection), |b, (i, text)| {
            b.document(i.to_string(), *text)
        })
        .build()?;
    let result = analyze_text(client, &request).await?;

    (0..texts.len())
        .map(|i| {
            let id = i.to_string();
            if let Some(error) = result.error(&id) {
                return Err(CognitiveError::OperationFailed {
                    operation: format!("language detection of document {id}"),
                    detail: error.to_string(),
                });
            }
            result
                .document(&id)
                .and_then(|d| d.detected_language.clone())
                .ok_or_else(|| CognitiveError::OperationFailed {
                    operation: format!("language detection of document {id}"),
                    detail: "no language in response".into(),
                })
        })
        .collect()
}
