//! Image Analysis 4.0: captions, tags, objects, OCR and people detection.
//!
//! The image is either referenced by URL or uploaded as raw bytes. Requested
//! features travel in the query string; each one fills the matching optional
//! field of [`ImageAnalysis`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use cognitive_services_core::client::CognitiveClient;
//! use cognitive_services_vision::image_analysis::{self, AnalyzeImageRequest, VisualFeature};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CognitiveClient::builder().env_prefix("COMPUTER_VISION").build()?;
//!
//! let request = AnalyzeImageRequest::builder()
//!     .url("https://example.com/street.jpg")
//!     .feature(VisualFeature::Caption)
//!     .feature(VisualFeature::Read)
//!     .build()?;
//! let analysis = image_analysis::analyze_image(&client, &request).await?;
//! if let Some(caption) = &analysis.caption_result {
//!     println!("{} ({:.2})", caption.text, caption.confidence);
//! }
//! for line in analysis.text_lines() {
//!     println!("{line}");
//! }
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use bytes::Bytes;
use cognitive_services_core::client::{encode_query, CognitiveClient};
use cognitive_services_core::error::{CognitiveError, CognitiveResult};
use serde::{Deserialize, Serialize};

use crate::models::IMAGE_ANALYSIS_API_VERSION;

const ANALYZE_PATH: &str = "/computervision/imageanalysis:analyze";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A feature the service should extract from the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisualFeature {
    Tags,
    Objects,
    Caption,
    DenseCaptions,
    /// Printed and handwritten text (OCR).
    Read,
    SmartCrops,
    People,
}

impl VisualFeature {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tags => "tags",
            Self::Objects => "objects",
            Self::Caption => "caption",
            Self::DenseCaptions => "denseCaptions",
            Self::Read => "read",
            Self::SmartCrops => "smartCrops",
            Self::People => "people",
        }
    }

    /// Captions are generated in English only.
    fn english_only(self) -> bool {
        matches!(self, Self::Caption | Self::DenseCaptions)
    }
}

/// Where the image comes from.
#[derive(Debug, Clone)]
enum ImageSource {
    Url(String),
    Data(Bytes),
}

#[derive(Serialize)]
struct UrlBody<'a> {
    url: &'a str,
}

/// Parameters of [`analyze_image`].
#[derive(Debug, Clone)]
pub struct AnalyzeImageRequest {
    source: ImageSource,
    features: Vec<VisualFeature>,
    language: String,
    model_version: String,
    gender_neutral_caption: Option<bool>,
    smartcrops_aspect_ratios: Vec<f64>,
}

impl AnalyzeImageRequest {
    pub fn builder() -> AnalyzeImageRequestBuilder {
        AnalyzeImageRequestBuilder::default()
    }

    pub fn features(&self) -> &[VisualFeature] {
        &self.features
    }

    /// Comma-separated feature list, in the order the features were added.
    pub fn features_param(&self) -> String {
        self.features
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub(crate) fn query(&self) -> String {
        let features = self.features_param();
        let gender_neutral = self.gender_neutral_caption.map(|g| g.to_string());
        let ratios = self
            .smartcrops_aspect_ratios
            .iter()
            .map(|r| format!("{r:.2}"))
            .collect::<Vec<_>>()
            .join(",");

        let mut pairs = vec![
            ("api-version", IMAGE_ANALYSIS_API_VERSION),
            ("features", features.as_str()),
            ("model-version", self.model_version.as_str()),
            ("language", self.language.as_str()),
        ];
        if let Some(g) = &gender_neutral {
            pairs.push(("gender-neutral-caption", g.as_str()));
        }
        if !ratios.is_empty() {
            pairs.push(("smartcrops-aspect-ratios", ratios.as_str()));
        }
        encode_query(pairs)
    }
}

/// Builder for [`AnalyzeImageRequest`].
#[derive(Debug, Default)]
pub struct AnalyzeImageRequestBuilder {
    url: Option<String>,
    data: Option<Bytes>,
    features: Vec<VisualFeature>,
    language: Option<String>,
    model_version: Option<String>,
    gender_neutral_caption: Option<bool>,
    smartcrops_aspect_ratios: Vec<f64>,
}

impl AnalyzeImageRequestBuilder {
    /// Analyzes the image at a public URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Uploads the image bytes instead of passing a URL.
    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Adds a feature. Duplicates are ignored.
    pub fn feature(mut self, feature: VisualFeature) -> Self {
        if !self.features.contains(&feature) {
            self.features.push(feature);
        }
        self
    }

    pub fn features(self, features: impl IntoIterator<Item = VisualFeature>) -> Self {
        features.into_iter().fold(self, Self::feature)
    }

    /// Output language. Defaults to `en`.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Model version. Defaults to `latest`.
    pub fn model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }

    pub fn gender_neutral_caption(mut self, neutral: bool) -> Self {
        self.gender_neutral_caption = Some(neutral);
        self
    }

    /// Width/height ratio of a requested smart crop, between 0.75 and 1.8.
    pub fn smartcrops_aspect_ratio(mut self, ratio: f64) -> Self {
        self.smartcrops_aspect_ratios.push(ratio);
        self
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns [`CognitiveError::Builder`] if:
    /// - neither or both of URL and data are set, or the chosen one is empty
    /// - no feature is requested
    /// - a caption feature is combined with a language other than `en`
    /// - an aspect ratio is outside `0.75..=1.8`
    pub fn build(self) -> CognitiveResult<AnalyzeImageRequest> {
        let source = match (self.url, self.data) {
            (Some(_), Some(_)) => {
                return Err(CognitiveError::Builder(
                    "url and data are mutually exclusive".into(),
                ))
            }
            (Some(url), None) if !url.is_empty() => ImageSource::Url(url),
            (None, Some(data)) if !data.is_empty() => ImageSource::Data(data),
            _ => {
                return Err(CognitiveError::Builder(
                    "a non-empty image url or data is required".into(),
                ))
            }
        };

        if self.features.is_empty() {
            return Err(CognitiveError::Builder(
                "at least one visual feature is required".into(),
            ));
        }

        let language = self.language.unwrap_or_else(|| "en".into());
        if language != "en" {
            if let Some(f) = self.features.iter().find(|f| f.english_only()) {
                return Err(CognitiveError::Builder(format!(
                    "feature {} only supports language \"en\", got \"{language}\"",
                    f.as_str()
                )));
            }
        }

        if let Some(r) = self
            .smartcrops_aspect_ratios
            .iter()
            .find(|r| !(0.75..=1.8).contains(*r))
        {
            return Err(CognitiveError::Builder(format!(
                "smart crop aspect ratio {r} is outside 0.75..=1.8"
            )));
        }

        Ok(AnalyzeImageRequest {
            source,
            features: self.features,
            language,
            model_version: self.model_version.unwrap_or_else(|| "latest".into()),
            gender_neutral_caption: self.gender_neutral_caption,
            smartcrops_aspect_ratios: self.smartcrops_aspect_ratios,
        })
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Tag {
    pub name: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caption {
    pub text: String,
    pub confidence: f64,
    /// Set for dense captions only.
    #[serde(default)]
    pub bounding_box: Option<Rectangle>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedObject {
    #[serde(default)]
    pub id: Option<String>,
    pub bounding_box: Rectangle,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedPerson {
    pub bounding_box: Rectangle,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRegion {
    pub aspect_ratio: f64,
    pub bounding_box: Rectangle,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub text: String,
    #[serde(default)]
    pub bounding_polygon: Vec<Point>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub text: String,
    #[serde(default)]
    pub bounding_polygon: Vec<Point>,
    #[serde(default)]
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub lines: Vec<Line>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReadResult {
    #[serde(default)]
    pub blocks: Vec<Block>,
}

/// A `{"values": [...]}` wrapper used by list-shaped results.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Values<T> {
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
}

/// Result of [`analyze_image`]. Only requested features are populated.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysis {
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub metadata: Option<ImageMetadata>,
    #[serde(default)]
    pub caption_result: Option<Caption>,
    #[serde(default)]
    pub dense_captions_result: Option<Values<Caption>>,
    #[serde(default)]
    pub tags_result: Option<Values<Tag>>,
    #[serde(default)]
    pub objects_result: Option<Values<DetectedObject>>,
    #[serde(default)]
    pub people_result: Option<Values<DetectedPerson>>,
    #[serde(default)]
    pub smart_crops_result: Option<Values<CropRegion>>,
    #[serde(default)]
    pub read_result: Option<ReadResult>,
}

impl ImageAnalysis {
    /// Recognized text lines in reading order.
    pub fn text_lines(&self) -> impl Iterator<Item = &str> {
        self.read_result
            .iter()
            .flat_map(|r| &r.blocks)
            .flat_map(|b| &b.lines)
            .map(|l| l.text.as_str())
    }

    /// Tag names with at least `min_confidence`.
    pub fn tag_names(&self, min_confidence: f64) -> Vec<&str> {
        self.tags_result
            .iter()
            .flat_map(|t| &t.values)
            .filter(|t| t.confidence >= min_confidence)
            .map(|t| t.name.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// API
// ---------------------------------------------------------------------------

/// Analyze an image.
///
/// URL sources are sent as `{"url": ...}`; uploaded bytes are sent as
/// `application/octet-stream`.
///
/// # Tracing
///
/// Emits a span named `cognitive::image_analysis::analyze_image` with field
/// `features`.
#[tracing::instrument(
    name = "cognitive::image_analysis::analyze_image",
    skip(client, request),
    fields(features = %request.features_param())
)]
pub async fn analyze_image(
    client: &CognitiveClient,
    request: &AnalyzeImageRequest,
) -> CognitiveResult<ImageAnalysis> {
    tracing::debug!("analyzing image");

    let path = format!("{ANALYZE_PATH}?{}", request.query());
    let response = match &request.source {
        ImageSource::Url(url) => client.post(&path, &UrlBody { url }).await?,
        ImageSource::Data(data) => {
            client
                .post_raw(&path, "application/octet-stream", data.clone(), &[])
                .await?
        }
    };
    let analysis = response.json::<ImageAnalysis>().await?;

    tracing::debug!(model_version = ?analysis.model_version, "image analyzed");
    Ok(analysis)
}

/// Read an image from disk and analyze it with the given features.
#[tracing::instrument(
    name = "cognitive::image_analysis::analyze_image_file",
    skip(client, features),
    fields(path = %path.display())
)]
pub async fn analyze_image_file(
    client: &CognitiveClient,
    path: &Path,
    features: &[VisualFeature],
) -> CognitiveResult<ImageAnalysis> {
    let data = tokio::fs::read(path).await?;
    let request = AnalyzeImageRequest::builder()
        .data(data)
        .features(features.iter().copied())
        .build()?;
    analyze_image(client, &request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{setup_mock_client, TEST_KEY};
    use wiremock::matchers::{body_bytes, body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn analysis_json() -> serde_json::Value {
        serde_json::json!({
            "modelVersion": "2023-10-01",
            "metadata": {"width": 640, "height": 480},
            "captionResult": {"text": "a person crossing a street", "confidence": 0.82},
            "tagsResult": {"values": [
                {"name": "outdoor", "confidence": 0.99},
                {"name": "street", "confidence": 0.91},
                {"name": "blur", "confidence": 0.31}
            ]},
            "objectsResult": {"values": [
                {"id": "", "boundingBox": {"x": 10, "y": 20, "w": 30, "h": 40},
                 "tags": [{"name": "person", "confidence": 0.88}]}
            ]},
            "readResult": {"blocks": [{"lines": [
                {"text": "STOP", "boundingPolygon": [{"x": 1, "y": 2}], "words": [
                    {"text": "STOP", "boundingPolygon": [{"x": 1, "y": 2}], "confidence": 0.99}
                ]},
                {"text": "Main St", "boundingPolygon": [], "words": []}
            ]}]}
        })
    }

    // -----------------------------------------------------------------------
    // Builder
    // -----------------------------------------------------------------------

    #[test]
    fn query_carries_features_and_defaults() {
        let request = AnalyzeImageRequest::builder()
            .url("https://example.com/a.jpg")
            .feature(VisualFeature::Tags)
            .feature(VisualFeature::Read)
            .feature(VisualFeature::Tags)
            .build()
            .unwrap();

        assert_eq!(request.features_param(), "tags,read");
        assert_eq!(
            request.query(),
            "api-version=2024-02-01&features=tags%2Cread&model-version=latest&language=en"
        );
    }

    #[test]
    fn query_includes_optional_parameters() {
        let request = AnalyzeImageRequest::builder()
            .url("https://example.com/a.jpg")
            .feature(VisualFeature::SmartCrops)
            .gender_neutral_caption(true)
            .smartcrops_aspect_ratio(0.9)
            .smartcrops_aspect_ratio(1.33)
            .build()
            .unwrap();

        let query = request.query();
        assert!(query.contains("gender-neutral-caption=true"));
        assert!(query.contains("smartcrops-aspect-ratios=0.90%2C1.33"));
    }

    #[test]
    fn builder_needs_one_source() {
        let base = || AnalyzeImageRequest::builder().feature(VisualFeature::Tags);

        assert!(base().build().is_err());
        assert!(base().url("").build().is_err());
        assert!(base().data(Vec::new()).build().is_err());
        assert!(base()
            .url("https://example.com/a.jpg")
            .data(b"img".to_vec())
            .build()
            .is_err());
        assert!(base().data(b"img".to_vec()).build().is_ok());
    }

    #[test]
    fn builder_needs_a_feature() {
        let err = AnalyzeImageRequest::builder()
            .url("https://example.com/a.jpg")
            .build()
            .unwrap_err();
        assert!(matches!(err, CognitiveError::Builder(_)));
    }

    #[test]
    fn captions_are_english_only() {
        let err = AnalyzeImageRequest::builder()
            .url("https://example.com/a.jpg")
            .feature(VisualFeature::Caption)
            .language("fr")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("caption"));

        assert!(AnalyzeImageRequest::builder()
            .url("https://example.com/a.jpg")
            .feature(VisualFeature::Read)
            .language("fr")
            .build()
            .is_ok());
    }

    #[test]
    fn aspect_ratio_range_is_checked() {
        let err = AnalyzeImageRequest::builder()
            .url("https://example.com/a.jpg")
            .feature(VisualFeature::SmartCrops)
            .smartcrops_aspect_ratio(2.0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("0.75..=1.8"));
    }

    // -----------------------------------------------------------------------
    // Response helpers
    // -----------------------------------------------------------------------

    #[test]
    fn analysis_exposes_text_and_tags() {
        let analysis: ImageAnalysis = serde_json::from_value(analysis_json()).unwrap();

        assert_eq!(analysis.text_lines().collect::<Vec<_>>(), ["STOP", "Main St"]);
        assert_eq!(analysis.tag_names(0.5), ["outdoor", "street"]);
        assert_eq!(analysis.metadata, Some(ImageMetadata { width: 640, height: 480 }));
        let objects = analysis.objects_result.unwrap().values;
        assert_eq!(objects[0].bounding_box, Rectangle { x: 10, y: 20, w: 30, h: 40 });
    }

    #[test]
    fn empty_analysis_has_no_text() {
        let analysis: ImageAnalysis = serde_json::from_str("{}").unwrap();
        assert_eq!(analysis.text_lines().count(), 0);
        assert!(analysis.tag_names(0.0).is_empty());
    }

    // -----------------------------------------------------------------------
    // API
    // -----------------------------------------------------------------------

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn analyze_image_by_url() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(ANALYZE_PATH))
            .and(query_param("features", "caption,tags"))
            .and(query_param("model-version", "latest"))
            .and(header("Ocp-Apim-Subscription-Key", TEST_KEY))
            .and(body_json(serde_json::json!({"url": "https://example.com/a.jpg"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(analysis_json()))
            .expect(1)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server);
        let request = AnalyzeImageRequest::builder()
            .url("https://example.com/a.jpg")
            .features([VisualFeature::Caption, VisualFeature::Tags])
            .build()
            .unwrap();

        let analysis = analyze_image(&client, &request).await.unwrap();
        assert_eq!(
            analysis.caption_result.map(|c| c.text).as_deref(),
            Some("a person crossing a street")
        );
        assert!(logs_contain("cognitive::image_analysis::analyze_image"));
    }

    #[tokio::test]
    async fn analyze_image_uploads_bytes() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(ANALYZE_PATH))
            .and(header("content-type", "application/octet-stream"))
            .and(body_bytes(b"jpeg-bytes".to_vec()))
            .respond_with(ResponseTemplate::new(200).set_body_json(analysis_json()))
            .expect(1)
            .mount(&server)
            .await;

        let client = setup_mock_client(&server);
        let request = AnalyzeImageRequest::builder()
            .data(&b"jpeg-bytes"[..])
            .feature(VisualFeature::Read)
            .build()
            .unwrap();

        let analysis = analyze_image(&client, &request).await.unwrap();
        assert_eq!(analysis.text_lines().next(), Some("STOP"));
    }

    #[tokio::test]
    async fn analyze_image_surfaces_service_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(ANALYZE_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"code": "InvalidRequest", "message": "Image format is not valid."}
            })))
            .mount(&server)
            .await;

        let client = setup_mock_client(&server);
        let request = AnalyzeImageRequest::builder()
            .url("https://example.com/a.txt")
            .feature(VisualFeature::Tags)
            .build()
            .unwrap();

        let err = analyze_image(&client, &request).await.unwrap_err();
        assert_eq!(err.code(), Some("InvalidRequest"));
    }

    #[tokio::test]
    async fn analyze_image_file_reports_missing_file() {
        let server = MockServer::start().await;
        let client = setup_mock_client(&server);

        let err = analyze_image_file(
            &client,
            Path::new("/nonexistent/street.jpg"),
            &[VisualFeature::Tags],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CognitiveError::Io(_)));
    }
}
