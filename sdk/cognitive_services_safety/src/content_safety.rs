//! Content Safety text and image analysis.
//!
//! [`analyze_text`] and [`analyze_image`] return a severity per harm category.
//! [`make_decision`] applies per-category reject thresholds to an analysis.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use base64::Engine as _;
use cognitive_services_core::client::CognitiveClient;
use cognitive_services_core::error::{CognitiveError, CognitiveResult};
use serde::{Deserialize, Serialize};

use crate::models::{
    BlocklistMatch, Category, CategoryAnalysis, OutputType, API_VERSION, MAX_TEXT_LENGTH,
};

/// Severities a reject threshold may take. `-1` disables the category.
pub const VALID_THRESHOLDS: [i8; 5] = [-1, 0, 2, 4, 6];

// ---------------------------------------------------------------------------
// Text analysis
// ---------------------------------------------------------------------------

/// Request body of [`analyze_text`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeTextRequest {
    text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    categories: Vec<Category>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    blocklist_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    halt_on_blocklist_hit: Option<bool>,
    output_type: OutputType,
}

impl AnalyzeTextRequest {
    pub fn builder() -> AnalyzeTextRequestBuilder {
        AnalyzeTextRequestBuilder::default()
    }

    pub fn blocklist_names(&self) -> &[String] {
        &self.blocklist_names
    }
}

/// Builder for [`AnalyzeTextRequest`].
#[derive(Debug, Default)]
pub struct AnalyzeTextRequestBuilder {
    text: Option<String>,
    categories: Vec<Category>,
    blocklist_names: Vec<String>,
    halt_on_blocklist_hit: Option<bool>,
    output_type: OutputType,
}

impl AnalyzeTextRequestBuilder {
    /// Sets the text to analyze (required).
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Restricts analysis to a category. All categories are analyzed by default.
    pub fn category(mut self, category: Category) -> Self {
        self.categories.push(category);
        self
    }

    /// Checks the text against a custom blocklist.
    pub fn blocklist(mut self, name: impl Into<String>) -> Self {
        self.blocklist_names.push(name.into());
        self
    }

    /// Stops analysis as soon as a blocklist item matches.
    pub fn halt_on_blocklist_hit(mut self, halt: bool) -> Self {
        self.halt_on_blocklist_hit = Some(halt);
        self
    }

    pub fn output_type(mut self, output_type: OutputType) -> Self {
        self.output_type = output_type;
        self
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns [`CognitiveError::Builder`] if the text is missing, empty, or
    /// longer than [`MAX_TEXT_LENGTH`] characters.
    pub fn build(self) -> CognitiveResult<AnalyzeTextRequest> {
        let text = self
            .text
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CognitiveError::Builder("text is required".into()))?;

        let len = text.chars().count();
        if len > MAX_TEXT_LENGTH {
            return Err(CognitiveError::Builder(format!(
                "text exceeds {MAX_TEXT_LENGTH} characters (got {len})"
            )));
        }

        Ok(AnalyzeTextRequest {
            text,
            categories: self.categories,
            blocklist_names: self.blocklist_names,
            halt_on_blocklist_hit: self.halt_on_blocklist_hit,
            output_type: self.output_type,
        })
    }
}

/// Result of [`analyze_text`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeTextResult {
    #[serde(default)]
    pub blocklists_match: Vec<BlocklistMatch>,
    #[serde(default)]
    pub categories_analysis: Vec<CategoryAnalysis>,
}

/// Analyze text for harmful content.
///
/// # Tracing
///
/// Emits a span named `cognitive::content_safety::analyze_text`.
#[tracing::instrument(
    name = "cognitive::content_safety::analyze_text",
    skip(client, request),
    fields(blocklists = request.blocklist_names().len())
)]
pub async fn analyze_text(
    client: &CognitiveClient,
    request: &AnalyzeTextRequest,
) -> CognitiveResult<AnalyzeTextResult> {
    tracing::debug!("analyzing text");

    let path = format!("/contentsafety/text:analyze?{API_VERSION}");
    let response = client.post(&path, request).await?;
    let result = response.json::<AnalyzeTextResult>().await?;

    tracing::debug!(
        categories = result.categories_analysis.len(),
        blocklist_matches = result.blocklists_match.len(),
        "text analyzed"
    );
    Ok(result)
}

// ---------------------------------------------------------------------------
// Image analysis
// ---------------------------------------------------------------------------

/// Image payload: inline base64 content or a blob URL.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    blob_url: Option<String>,
}

/// Request body of [`analyze_image`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeImageRequest {
    image: ImageData,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    categories: Vec<Category>,
    output_type: OutputType,
}

impl AnalyzeImageRequest {
    pub fn builder() -> AnalyzeImageRequestBuilder {
        AnalyzeImageRequestBuilder::default()
    }
}

/// Builder for [`AnalyzeImageRequest`].
#[derive(Debug, Default)]
pub struct AnalyzeImageRequestBuilder {
    content: Option<Vec<u8>>,
    blob_url: Option<String>,
    categories: Vec<Category>,
}

impl AnalyzeImageRequestBuilder {
    /// Sets the raw image bytes. They are sent base64-encoded.
    pub fn content(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.content = Some(data.into());
        self
    }

    /// Sets a blob-storage URL of the image instead of inline content.
    pub fn blob_url(mut self, url: impl Into<String>) -> Self {
        self.blob_url = Some(url.into());
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.categories.push(category);
        self
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns [`CognitiveError::Builder`] unless exactly one of content or
    /// blob URL is set, or if the content is empty.
    pub fn build(self) -> CognitiveResult<AnalyzeImageRequest> {
        let image = match (self.content, self.blob_url) {
            (Some(_), Some(_)) => {
                return Err(CognitiveError::Builder(
                    "content and blob_url are mutually exclusive".into(),
                ))
            }
            (Some(data), None) if data.is_empty() => {
                return Err(CognitiveError::Builder("image content cannot be empty".into()))
            }
            (Some(data), None) => ImageData {
                content: Some(base64::engine::general_purpose::STANDARD.encode(data)),
                blob_url: None,
            },
            (None, Some(url)) if !url.is_empty() => ImageData {
                content: None,
                blob_url: Some(url),
            },
            _ => {
                return Err(CognitiveError::Builder(
                    "image content or blob_url is required".into(),
                ))
            }
        };

        Ok(AnalyzeImageRequest {
            image,
            categories: self.categories,
            output_type: OutputType::FourSeverityLevels,
        })
    }
}

/// Result of [`analyze_image`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeImageResult {
    #[serde(default)]
    pub categories_analysis: Vec<CategoryAnalysis>,
}

/// Analyze an image for harmful content.
///
/// # Tracing
///
/// Emits a span named `cognitive::content_safety::analyze_image`.
#[tracing::instrument(name = "cognitive::content_safety::analyze_image", skip(client, request))]
pub async fn analyze_image(
    client: &CognitiveClient,
    request: &AnalyzeImageRequest,
) -> CognitiveResult<AnalyzeImageResult> {
    tracing::debug!("analyzing image");

    let path = format!("/contentsafety/image:analyze?{API_VERSION}");
    let response = client.post(&path, request).await?;
    Ok(response.json::<AnalyzeImageResult>().await?)
}

/// Read an image from disk and analyze it.
#[tracing::instrument(
    name = "cognitive::content_safety::analyze_image_file",
    skip(client),
    fields(path = %path.display())
)]
pub async fn analyze_image_file(
    client: &CognitiveClient,
    path: &Path,
) -> CognitiveResult<AnalyzeImageResult> {
    let data = tokio::fs::read(path).await?;
    let request = AnalyzeImageRequest::builder().content(data).build()?;
    analyze_image(client, &request).await
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Verdict for a category or for the whole analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Accept,
    Reject,
}

/// Outcome of [`make_decision`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub suggested_action: Action,
    pub action_by_category: HashMap<Category, Action>,
    pub severity_by_category: HashMap<Category, u8>,
}

/// An analysis result a decision can be made on.
pub trait SafetyAnalysis {
    fn categories_analysis(&self) -> &[CategoryAnalysis];

    fn blocklists_match(&self) -> &[BlocklistMatch] {
        &[]
    }
}

impl SafetyAnalysis for AnalyzeTextResult {
    fn categories_analysis(&self) -> &[CategoryAnalysis] {
        &self.categories_analysis
    }

    fn blocklists_match(&self) -> &[BlocklistMatch] {
        &self.blocklists_match
    }
}

impl SafetyAnalysis for AnalyzeImageResult {
    fn categories_analysis(&self) -> &[CategoryAnalysis] {
        &self.categories_analysis
    }
}

/// Decide whether to accept or reject analyzed content.
///
/// A category is rejected when its threshold is not `-1` and its severity is at
/// least the threshold. Any blocklist match rejects the content regardless of
/// the categories. Only categories present in `thresholds` are judged.
///
/// # Errors
///
/// Returns [`CognitiveError::Builder`] if a threshold is not one of
/// [`VALID_THRESHOLDS`], or if a thresholded category is missing from the
/// analysis or has no severity.
pub fn make_decision(
    analysis: &impl SafetyAnalysis,
    thresholds: &BTreeMap<Category, i8>,
) -> CognitiveResult<Decision> {
    let mut action_by_category = HashMap::new();
    let mut severity_by_category = HashMap::new();
    let mut suggested_action = Action::Accept;

    for (&category, &threshold) in thresholds {
        if !VALID_THRESHOLDS.contains(&threshold) {
            return Err(CognitiveError::Builder(format!(
                "reject threshold for {category} must be one of {VALID_THRESHOLDS:?}, got {threshold}"
            )));
        }

        let severity = analysis
            .categories_analysis()
            .iter()
            .find(|a| a.category == category)
            .ok_or_else(|| {
                CognitiveError::Builder(format!("category {category} not found in analysis"))
            })?
            .severity
            .ok_or_else(|| {
                CognitiveError::Builder(format!("category {category} has no severity"))
            })?;

        let action = if threshold != -1 && i16::from(severity) >= i16::from(threshold) {
            Action::Reject
        } else {
            Action::Accept
        };
        if action == Action::Reject {
            suggested_action = Action::Reject;
        }

        action_by_category.insert(category, action);
        severity_by_category.insert(category, severity);
    }

    if !analysis.blocklists_match().is_empty() {
        tracing::debug!(
            matches = analysis.blocklists_match().len(),
            "blocklist match, rejecting"
        );
        suggested_action = Action::Reject;
    }

    Ok(Decision {
        suggested_action,
        action_by_category,
        severity_by_category,
    })
}
