//! Document translation client for Azure Translator.
//!
//! Two modes are supported:
//!
//! - **Batch**: translate every document of a blob-storage container (or a
//!   single blob) into one or more target containers. [`start_batch`] returns a
//!   batch id; the batch is a long-running operation observed with
//!   [`get_batch_status`] or awaited with [`wait_for_batch`].
//! - **Synchronous**: [`translate_document`] uploads one document and returns
//!   the translated bytes directly.
//!
//! Storage URLs usually carry SAS tokens. Error messages echoing them are
//! redacted by the client.

use std::path::Path;

use bytes::Bytes;
use cognitive_services_core::client::{encode_query, CognitiveClient, FilePart};
use cognitive_services_core::error::{CognitiveError, CognitiveResult};
use cognitive_services_core::lro::{self, PollOptions, StatusSet};
use cognitive_services_core::models::InnerError;
use serde::{Deserialize, Serialize};

use crate::models::DOCUMENT_API_VERSION;

const BATCHES_PATH: &str = "/translator/document/batches";

fn api_version() -> String {
    encode_query([("api-version", DOCUMENT_API_VERSION)])
}

// ---------------------------------------------------------------------------
// Batch request types
// ---------------------------------------------------------------------------

/// Whether a batch source or target is a container (folder) or a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StorageType {
    Folder,
    File,
}

/// Source documents of a batch input.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSource {
    pub source_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// A glossary applied to one target.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Glossary {
    pub glossary_url: String,
    /// File format of the glossary, e.g. `XLIFF`, `TSV`, `CSV`.
    pub format: String,
}

/// Destination container and language of a batch input.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTarget {
    pub target_url: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub glossaries: Vec<Glossary>,
}

/// One source with its targets.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInput {
    pub source: BatchSource,
    pub targets: Vec<BatchTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_type: Option<StorageType>,
}

impl BatchInput {
    /// Translate the documents found at `source_url`.
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source: BatchSource {
                source_url: source_url.into(),
                language: None,
            },
            targets: Vec::new(),
            storage_type: None,
        }
    }

    /// Set the source language. Detected per document when unset.
    pub fn source_language(mut self, language: impl Into<String>) -> Self {
        self.source.language = Some(language.into());
        self
    }

    /// Add a target container and language.
    pub fn target(mut self, target_url: impl Into<String>, language: impl Into<String>) -> Self {
        self.targets.push(BatchTarget {
            target_url: target_url.into(),
            language: language.into(),
            category: None,
            glossaries: Vec::new(),
        });
        self
    }

    /// Add a fully specified target.
    pub fn target_with(mut self, target: BatchTarget) -> Self {
        self.targets.push(target);
        self
    }

    pub fn storage_type(mut self, storage_type: StorageType) -> Self {
        self.storage_type = Some(storage_type);
        self
    }
}

/// Body of a start-batch request.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRequest {
    inputs: Vec<BatchInput>,
}

impl BatchRequest {
    pub fn builder() -> BatchRequestBuilder {
        BatchRequestBuilder::default()
    }

    pub fn inputs(&self) -> &[BatchInput] {
        &self.inputs
    }
}

/// Builder for [`BatchRequest`].
#[derive(Debug, Default)]
pub struct BatchRequestBuilder {
    inputs: Vec<BatchInput>,
}

impl BatchRequestBuilder {
    /// Add a source with its targets (at least one input is required).
    pub fn input(mut self, input: BatchInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns [`CognitiveError::Builder`] if there is no input, an input has no
    /// target, or a URL or language is empty.
    pub fn build(self) -> CognitiveResult<BatchRequest> {
        if self.inputs.is_empty() {
            return Err(CognitiveError::Builder("at least one input is required".into()));
        }

        for input in &self.inputs {
            if input.source.source_url.is_empty() {
                return Err(CognitiveError::Builder("source_url cannot be empty".into()));
            }
            if input.targets.is_empty() {
                return Err(CognitiveError::Builder(
                    "each input needs at least one target".into(),
                ));
            }
            for target in &input.targets {
                if target.target_url.is_empty() || target.language.is_empty() {
                    return Err(CognitiveError::Builder(
                        "target_url and language are required for every target".into(),
                    ));
                }
            }
        }

        Ok(BatchRequest {
            inputs: self.inputs,
        })
    }
}

// ---------------------------------------------------------------------------
// Status types
// ---------------------------------------------------------------------------

/// Document counts of a batch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub success: u32,
    #[serde(default)]
    pub in_progress: u32,
    #[serde(default)]
    pub not_yet_started: u32,
    #[serde(default)]
    pub cancelled: u32,
    #[serde(default)]
    pub total_character_charged: u64,
}

/// Status of a translation batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatus {
    pub id: String,
    /// `NotStarted`, `Running`, `Succeeded`, `Failed`, `Cancelling`,
    /// `Cancelled` or `ValidationFailed`.
    pub status: String,
    #[serde(default)]
    pub created_date_time_utc: Option<String>,
    #[serde(default)]
    pub last_action_date_time_utc: Option<String>,
    #[serde(default)]
    pub error: Option<InnerError>,
    #[serde(default)]
    pub summary: BatchSummary,
}

/// Status of one document of a batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStatus {
    pub id: String,
    pub status: String,
    /// Location of the translated document.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub source_path: Option<String>,
    /// Target language.
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub character_charged: u64,
    #[serde(default)]
    pub error: Option<InnerError>,
}

/// Status vocabulary of translation batches.
pub fn batch_statuses() -> StatusSet {
    StatusSet::new(
        ["NotStarted", "Running", "Cancelling"],
        ["Succeeded"],
        ["Failed", "Cancelled", "ValidationFailed"],
    )
}

// ---------------------------------------------------------------------------
// Batch API
// ---------------------------------------------------------------------------

/// Extract the batch id from an `Operation-Location` URL.
fn batch_id_from_location(location: &str) -> Option<String> {
    let url = url::Url::parse(location).ok()?;
    url.path_segments()?
        .rev()
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Start a batch translation.
///
/// Returns the batch id taken from the `Operation-Location` header of the
/// `202 Accepted` response.
///
/// # Tracing
///
/// Emits a span named `cognitive::document_translation::start_batch`.
#[tracing::instrument(
    name = "cognitive::document_translation::start_batch",
    skip(client, request),
    fields(inputs = request.inputs().len())
)]
pub async fn start_batch(client: &CognitiveClient, request: &BatchRequest) -> CognitiveResult<String> {
    tracing::debug!("starting batch translation");

    let path = format!("{BATCHES_PATH}?{}", api_version());
    let response = client.post(&path, request).await?;
    let status = response.status().as_u16();

    let location = response
        .headers()
        .get("Operation-Location")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| CognitiveError::Api {
            status,
            code: "MissingHeader".into(),
            message: "Operation-Location header missing from response".into(),
        })?;

    let batch_id = batch_id_from_location(location).ok_or_else(|| CognitiveError::Api {
        status,
        code: "InvalidHeader".into(),
        message: format!("cannot read batch id from Operation-Location '{location}'"),
    })?;

    tracing::debug!(batch_id = %batch_id, "batch translation started");
    Ok(batch_id)
}

/// Get the status of a batch.
#[tracing::instrument(
    name = "cognitive::document_translation::get_batch_status",
    skip(client),
    fields(batch_id = %batch_id)
)]
pub async fn get_batch_status(client: &CognitiveClient, batch_id: &str) -> CognitiveResult<BatchStatus> {
    let path = format!("{BATCHES_PATH}/{batch_id}?{}", api_version());
    let response = client.get(&path).await?;
    Ok(response.json::<BatchStatus>().await?)
}

/// List the status of every document of a batch.
///
/// Follows `@nextLink` until all pages are read.
#[tracing::instrument(
    name = "cognitive::document_translation::list_document_statuses",
    skip(client),
    fields(batch_id = %batch_id)
)]
pub async fn list_document_statuses(
    client: &CognitiveClient,
    batch_id: &str,
) -> CognitiveResult<Vec<DocumentStatus>> {
    let path = format!("{BATCHES_PATH}/{batch_id}/documents?{}", api_version());
    let documents = client.get_paged::<DocumentStatus>(&path).await?;

    tracing::debug!(count = documents.len(), "listed document statuses");
    Ok(documents)
}

/// Get the status of one document of a batch.
#[tracing::instrument(
    name = "cognitive::document_translation::get_document_status",
    skip(client),
    fields(batch_id = %batch_id, document_id = %document_id)
)]
pub async fn get_document_status(
    client: &CognitiveClient,
    batch_id: &str,
    document_id: &str,
) -> CognitiveResult<DocumentStatus> {
    let path = format!(
        "{BATCHES_PATH}/{batch_id}/documents/{document_id}?{}",
        api_version()
    );
    let response = client.get(&path).await?;
    Ok(response.json::<DocumentStatus>().await?)
}

/// Wait until a batch reaches a terminal status.
///
/// # Errors
///
/// Returns [`CognitiveError::OperationFailed`] carrying the batch error for
/// `Failed`, `Cancelled` and `ValidationFailed`.
///
/// # Tracing
///
/// Emits a span named `cognitive::document_translation::wait_for_batch`.
#[tracing::instrument(
    name = "cognitive::document_translation::wait_for_batch",
    skip(client, options),
    fields(batch_id = %batch_id)
)]
pub async fn wait_for_batch(
    client: &CognitiveClient,
    batch_id: &str,
    options: &PollOptions,
) -> CognitiveResult<BatchStatus> {
    let statuses = batch_statuses();

    let done = lro::poll_until(
        &format!("translation batch {batch_id}"),
        options,
        || get_batch_status(client, batch_id),
        |batch: &BatchStatus| {
            let detail = batch.error.as_ref().map(ToString::to_string);
            statuses.classify_with_detail(&batch.status, detail.as_deref())
        },
    )
    .await?;

    tracing::debug!(
        total = done.summary.total,
        failed = done.summary.failed,
        "batch translation finished"
    );
    Ok(done)
}

// ---------------------------------------------------------------------------
// Synchronous translation
// ---------------------------------------------------------------------------

/// MIME type of a document or glossary, from its file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("pptx") => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("txt") => "text/plain",
        Some("csv") => "text/csv",
        Some("tsv") => "text/tab-separated-values",
        Some("html" | "htm") => "text/html",
        Some("xml") => "application/xml",
        Some("xlf" | "xliff") => "application/xliff+xml",
        _ => "application/octet-stream",
    }
}

/// Parameters of [`translate_document`].
#[derive(Debug, Clone)]
pub struct DocumentTranslateRequest {
    document: FilePart,
    glossary: Option<FilePart>,
    target_language: String,
    source_language: Option<String>,
    category: Option<String>,
    allow_fallback: Option<bool>,
}

impl DocumentTranslateRequest {
    pub fn builder() -> DocumentTranslateRequestBuilder {
        DocumentTranslateRequestBuilder::default()
    }

    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    fn query_string(&self) -> String {
        let allow_fallback = self.allow_fallback.map(|b| b.to_string());
        let mut pairs = vec![
            ("targetLanguage", self.target_language.as_str()),
            ("api-version", DOCUMENT_API_VERSION),
        ];
        if let Some(source) = &self.source_language {
            pairs.push(("sourceLanguage", source.as_str()));
        }
        if let Some(category) = &self.category {
            pairs.push(("category", category.as_str()));
        }
        if let Some(allow) = &allow_fallback {
            pairs.push(("allowFallback", allow.as_str()));
        }
        encode_query(pairs)
    }

    fn parts(&self) -> Vec<FilePart> {
        std::iter::once(self.document.clone())
            .chain(self.glossary.clone())
            .collect()
    }
}

/// Builder for [`DocumentTranslateRequest`].
#[derive(Debug, Default)]
pub struct DocumentTranslateRequestBuilder {
    document: Option<FilePart>,
    glossary: Option<FilePart>,
    target_language: Option<String>,
    source_language: Option<String>,
    category: Option<String>,
    allow_fallback: Option<bool>,
}

impl DocumentTranslateRequestBuilder {
    /// Sets the document to translate (required).
    pub fn document(mut self, file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        let content_type = content_type_for(Path::new(&file_name));
        self.document = Some(FilePart::new("document", file_name, data).content_type(content_type));
        self
    }

    /// Sets a glossary applied to the translation.
    pub fn glossary(mut self, file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        let content_type = content_type_for(Path::new(&file_name));
        self.glossary = Some(FilePart::new("glossary", file_name, data).content_type(content_type));
        self
    }

    /// Sets the target language (required).
    pub fn target_language(mut self, language: impl Into<String>) -> Self {
        self.target_language = Some(language.into());
        self
    }

    pub fn source_language(mut self, language: impl Into<String>) -> Self {
        self.source_language = Some(language.into());
        self
    }

    /// Sets a custom translator category id.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Fall back to the general system when the custom category is unavailable.
    pub fn allow_fallback(mut self, allow: bool) -> Self {
        self.allow_fallback = Some(allow);
        self
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns [`CognitiveError::Builder`] if the document or target language is
    /// missing, or the document is empty.
    pub fn build(self) -> CognitiveResult<DocumentTranslateRequest> {
        let document = self
            .document
            .ok_or_else(|| CognitiveError::Builder("document is required".into()))?;
        if document.data.is_empty() {
            return Err(CognitiveError::Builder("document cannot be empty".into()));
        }

        let target_language = self
            .target_language
            .filter(|l| !l.is_empty())
            .ok_or_else(|| CognitiveError::Builder("target_language is required".into()))?;

        Ok(DocumentTranslateRequest {
            document,
            glossary: self.glossary,
            target_language,
            source_language: self.source_language,
            category: self.category,
            allow_fallback: self.allow_fallback,
        })
    }
}

/// Read a document (and optional glossary) from disk into a request builder.
pub async fn request_from_files(
    document: &Path,
    glossary: Option<&Path>,
) -> CognitiveResult<DocumentTranslateRequestBuilder> {
    let file_name = |p: &Path| {
        p.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    };

    let mut builder = DocumentTranslateRequest::builder()
        .document(file_name(document), tokio::fs::read(document).await?);
    if let Some(glossary) = glossary {
        builder = builder.glossary(file_name(glossary), tokio::fs::read(glossary).await?);
    }
    Ok(builder)
}

/// Translate one document synchronously and return the translated content.
///
/// # Tracing
///
/// Emits a span named `cognitive::document_translation::translate_document`.
#[tracing::instrument(
    name = "cognitive::document_translation::translate_document",
    skip(client, request),
    fields(target_language = %request.target_language())
)]
pub async fn translate_document(
    client: &CognitiveClient,
    request: &DocumentTranslateRequest,
) -> CognitiveResult<Bytes> {
    tracing::debug!(bytes = request.document.data.len(), "translating document");

    let path = format!("/translator/document:translate?{}", request.query_string());
    let response = client.post_multipart(&path, &request.parts()).await?;
    let translated = response.bytes().await?;

    tracing::debug!(bytes = translated.len(), "document translated");
    Ok(translated)
}
