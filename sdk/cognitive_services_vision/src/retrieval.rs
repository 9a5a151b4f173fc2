//! Video retrieval client for the Azure Computer Vision retrieval API.
//!
//! A retrieval index is a namespace of videos. Videos are added to an index
//! through named ingestions, which are long-running operations. Once an
//! ingestion completes, segments of the indexed videos can be searched by text.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cognitive_services_core::client::CognitiveClient;
//! use cognitive_services_vision::retrieval::{
//!     self, CreateIndexRequest, Feature, FieldType, IngestOptions, IngestionDocument,
//!     IngestionRequest, MetadataField, SearchQuery,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CognitiveClient::builder().env_prefix("COMPUTER_VISION").build()?;
//!
//! if !retrieval::index_exists(&client, "my-video-indexer").await? {
//!     let index = CreateIndexRequest::builder()
//!         .field(MetadataField::filterable("cameraId", FieldType::String))
//!         .feature(Feature::new("vision").domain("surveillance"))
//!         .build()?;
//!     retrieval::create_index(&client, "my-video-indexer", &index).await?;
//! }
//!
//! let videos = IngestionRequest::new(vec![IngestionDocument::add(
//!     "night-video",
//!     "https://example.com/night.mp4",
//! )]);
//! retrieval::ingest_and_wait(&client, "my-video-indexer", "video-1", &videos, &IngestOptions::default())
//!     .await?;
//!
//! let query = SearchQuery::builder().query_text("woman").build()?;
//! let results = retrieval::query_by_text(&client, "my-video-indexer", &query).await?;
//! for hit in &results.value {
//!     println!("{} {}..{} ({:.2})", hit.document_id, hit.start, hit.end, hit.relevance);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use cognitive_services_core::client::CognitiveClient;
use cognitive_services_core::error::{CognitiveError, CognitiveResult};
use cognitive_services_core::lro::{self, PollOptions, PollState, StatusSet};
use serde::{Deserialize, Serialize};

use crate::models::RETRIEVAL_API_VERSION;

fn index_path(index: &str) -> String {
    format!("/computervision/retrieval/indexes/{index}")
}

fn ingestion_path(index: &str, ingestion: &str) -> String {
    format!("{}/ingestions/{ingestion}", index_path(index))
}

// ---------------------------------------------------------------------------
// Index types
// ---------------------------------------------------------------------------

/// Data type of a metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Datetime,
}

/// A metadata field that documents in the index may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataField {
    pub name: String,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub filterable: bool,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl MetadataField {
    /// A field usable in `stringFilters` but not in free-text search.
    pub fn filterable(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            searchable: false,
            filterable: true,
            field_type,
        }
    }

    /// A field matched by free-text search.
    pub fn searchable(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            searchable: true,
            filterable: false,
            field_type,
        }
    }
}

/// Metadata schema of an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub fields: Vec<MetadataField>,
}

/// An analysis feature (`vision`, `speech`) enabled on an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl Feature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model_version: None,
            domain: None,
        }
    }

    /// Set the feature domain, e.g. `surveillance` or `generic`.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }
}

/// Body of a create-index request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIndexRequest {
    metadata_schema: MetadataSchema,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    features: Vec<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<serde_json::Value>,
}

impl CreateIndexRequest {
    pub fn builder() -> CreateIndexRequestBuilder {
        CreateIndexRequestBuilder::default()
    }

    pub fn fields(&self) -> &[MetadataField] {
        &self.metadata_schema.fields
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }
}

/// Builder for [`CreateIndexRequest`].
#[derive(Debug, Default)]
pub struct CreateIndexRequestBuilder {
    language: Option<String>,
    fields: Vec<MetadataField>,
    features: Vec<Feature>,
    user_data: Option<serde_json::Value>,
}

impl CreateIndexRequestBuilder {
    /// Language of searchable metadata, e.g. `en`.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Add a metadata field to the schema.
    pub fn field(mut self, field: MetadataField) -> Self {
        self.fields.push(field);
        self
    }

    /// Enable an analysis feature. The service enables `vision` and `speech`
    /// when none is given.
    pub fn feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    /// Attach arbitrary user data to the index.
    pub fn user_data(mut self, data: serde_json::Value) -> Self {
        self.user_data = Some(data);
        self
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns [`CognitiveError::Builder`] if a field or feature has an empty
    /// name, or if two fields share a name.
    pub fn build(self) -> CognitiveResult<CreateIndexRequest> {
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(CognitiveError::Builder(
                    "metadata field name cannot be empty".into(),
                ));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(CognitiveError::Builder(format!(
                    "duplicate metadata field '{}'",
                    field.name
                )));
            }
        }
        if self.features.iter().any(|f| f.name.is_empty()) {
            return Err(CognitiveError::Builder("feature name cannot be empty".into()));
        }

        Ok(CreateIndexRequest {
            metadata_schema: MetadataSchema {
                language: self.language,
                fields: self.fields,
            },
            features: self.features,
            user_data: self.user_data,
        })
    }
}

/// A retrieval index.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub name: String,
    #[serde(default)]
    pub metadata_schema: Option<MetadataSchema>,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub user_data: Option<serde_json::Value>,
    #[serde(default, rename = "eTag")]
    pub etag: Option<String>,
    #[serde(default)]
    pub created_date_time: Option<String>,
    #[serde(default)]
    pub last_modified_date_time: Option<String>,
}

// ---------------------------------------------------------------------------
// Ingestion types
// ---------------------------------------------------------------------------

/// What an ingestion does with a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionMode {
    Add,
    Update,
    Remove,
}

/// A video added to, updated in, or removed from an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionDocument {
    pub mode: IngestionMode,
    pub document_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl IngestionDocument {
    /// Add the video at `url` under `document_id`.
    pub fn add(document_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            mode: IngestionMode::Add,
            document_id: document_id.into(),
            document_url: Some(url.into()),
            metadata: HashMap::new(),
        }
    }

    /// Replace the video or metadata stored under `document_id`.
    pub fn update(document_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            mode: IngestionMode::Update,
            ..Self::add(document_id, url)
        }
    }

    /// Remove `document_id` from the index.
    pub fn remove(document_id: impl Into<String>) -> Self {
        Self {
            mode: IngestionMode::Remove,
            document_id: document_id.into(),
            document_url: None,
            metadata: HashMap::new(),
        }
    }

    /// Set a metadata value. The key must be a field of the index schema.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Body of a create- or update-ingestion request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionRequest {
    pub videos: Vec<IngestionDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_insight_intervals: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_speech_transcript: Option<bool>,
}

impl IngestionRequest {
    pub fn new(videos: Vec<IngestionDocument>) -> Self {
        Self {
            videos,
            generate_insight_intervals: None,
            include_speech_transcript: None,
        }
    }
}

/// An ingestion and its processing state.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingestion {
    pub name: String,
    /// `NotStarted`, `Running`, `Completed`, `Failed` or `PartiallySucceeded`.
    pub state: String,
    #[serde(default)]
    pub batch_name: Option<String>,
    #[serde(default)]
    pub created_date_time: Option<String>,
    #[serde(default)]
    pub last_modified_date_time: Option<String>,
}

/// A document stored in an index.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedDocument {
    pub document_id: String,
    #[serde(default)]
    pub document_url: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub created_date_time: Option<String>,
    #[serde(default)]
    pub last_modified_date_time: Option<String>,
}

/// Status vocabulary of video ingestions.
///
/// `PartiallySucceeded` counts as a failure: some videos of the batch were not
/// indexed. Use [`StatusSet::treat_as`] to accept partial results instead.
pub fn ingestion_statuses() -> StatusSet {
    StatusSet::new(
        ["NotStarted", "Running"],
        ["Completed"],
        ["Failed", "PartiallySucceeded"],
    )
}

/// Options for [`ingest_and_wait`].
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Poll interval, and the deadline shared by every wait.
    pub poll: PollOptions,
    /// How many times a failed ingestion is resubmitted before giving up.
    pub max_resubmits: u32,
    /// Status classification used while waiting.
    pub statuses: StatusSet,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            poll: PollOptions::default(),
            max_resubmits: 3,
            statuses: ingestion_statuses(),
        }
    }
}

// ---------------------------------------------------------------------------
// Search types
// ---------------------------------------------------------------------------

/// Restrict results to documents whose metadata field has one of `values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StringFilter {
    pub field_name: String,
    pub values: Vec<String>,
}

/// Filters applied to a text query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub string_filters: Vec<StringFilter>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub feature_filters: Vec<String>,
}

/// A text query against an index.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    query_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<SearchFilters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top: Option<u32>,
}

impl SearchQuery {
    pub fn builder() -> SearchQueryBuilder {
        SearchQueryBuilder::default()
    }

    pub fn query_text(&self) -> &str {
        &self.query_text
    }
}

/// Builder for [`SearchQuery`].
#[derive(Debug, Default)]
pub struct SearchQueryBuilder {
    query_text: Option<String>,
    filters: SearchFilters,
    top: Option<u32>,
}

impl SearchQueryBuilder {
    /// Sets the natural-language query (required).
    pub fn query_text(mut self, text: impl Into<String>) -> Self {
        self.query_text = Some(text.into());
        self
    }

    /// Only return documents whose `field` has one of `values`.
    pub fn string_filter<I, S>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.string_filters.push(StringFilter {
            field_name: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Only match against the given features, e.g. `vision`, `speech`.
    pub fn feature_filter(mut self, feature: impl Into<String>) -> Self {
        self.filters.feature_filters.push(feature.into());
        self
    }

    /// Maximum number of results.
    pub fn top(mut self, top: u32) -> Self {
        self.top = Some(top);
        self
    }

    /// Builds the query.
    ///
    /// # Errors
    ///
    /// Returns [`CognitiveError::Builder`] if `query_text` is missing or empty,
    /// a string filter has no values, or `top` is zero.
    pub fn build(self) -> CognitiveResult<SearchQuery> {
        let query_text = self
            .query_text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CognitiveError::Builder("query_text is required".into()))?;

        if let Some(filter) = self.filters.string_filters.iter().find(|f| f.values.is_empty()) {
            return Err(CognitiveError::Builder(format!(
                "string filter on '{}' needs at least one value",
                filter.field_name
            )));
        }
        if self.top == Some(0) {
            return Err(CognitiveError::Builder("top must be at least 1".into()));
        }

        let filters = (self.filters != SearchFilters::default()).then_some(self.filters);

        Ok(SearchQuery {
            query_text,
            filters,
            top: self.top,
        })
    }
}

/// A video segment matching a query.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub document_id: String,
    #[serde(default)]
    pub document_kind: Option<String>,
    /// Segment start, as `HH:MM:SS`.
    pub start: String,
    /// Segment end, as `HH:MM:SS`.
    pub end: String,
    /// Most representative timestamp of the segment.
    #[serde(default)]
    pub best: Option<String>,
    pub relevance: f64,
}

/// Results of [`query_by_text`].
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub value: Vec<SearchResult>,
}

// ---------------------------------------------------------------------------
// Index API
// ---------------------------------------------------------------------------

/// Create a retrieval index.
///
/// # Tracing
///
/// Emits a span named `cognitive::retrieval::create_index`.
#[tracing::instrument(
    name = "cognitive::retrieval::create_index",
    skip(client, request),
    fields(index = %index)
)]
pub async fn create_index(
    client: &CognitiveClient,
    index: &str,
    request: &CreateIndexRequest,
) -> CognitiveResult<Index> {
    tracing::debug!(fields = request.fields().len(), "creating index");

    let path = format!("{}?{RETRIEVAL_API_VERSION}", index_path(index));
    let response = client.put(&path, request).await?;
    let created = response.json::<Index>().await?;

    tracing::debug!("index created");
    Ok(created)
}

/// Get an index.
#[tracing::instrument(
    name = "cognitive::retrieval::get_index",
    skip(client),
    fields(index = %index)
)]
pub async fn get_index(client: &CognitiveClient, index: &str) -> CognitiveResult<Index> {
    let path = format!("{}?{RETRIEVAL_API_VERSION}", index_path(index));
    let response = client.get(&path).await?;
    Ok(response.json::<Index>().await?)
}

/// Returns `true` if the index exists, `false` if the service answers 404.
#[tracing::instrument(
    name = "cognitive::retrieval::index_exists",
    skip(client),
    fields(index = %index)
)]
pub async fn index_exists(client: &CognitiveClient, index: &str) -> CognitiveResult<bool> {
    match get_index(client, index).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Delete an index and everything ingested into it.
#[tracing::instrument(
    name = "cognitive::retrieval::delete_index",
    skip(client),
    fields(index = %index)
)]
pub async fn delete_index(client: &CognitiveClient, index: &str) -> CognitiveResult<()> {
    tracing::debug!("deleting index");

    let path = format!("{}?{RETRIEVAL_API_VERSION}", index_path(index));
    client.delete(&path).await?;
    Ok(())
}

/// Wait until a newly created index is readable.
///
/// The index may answer 404 for a short time after creation; that is treated
/// as pending.
///
/// # Tracing
///
/// Emits a span named `cognitive::retrieval::wait_for_index`.
#[tracing::instrument(
    name = "cognitive::retrieval::wait_for_index",
    skip(client, options),
    fields(index = %index)
)]
pub async fn wait_for_index(
    client: &CognitiveClient,
    index: &str,
    options: &PollOptions,
) -> CognitiveResult<Index> {
    let operation = format!("index {index}");

    let found = lro::poll_until(
        &operation,
        options,
        move || async move {
            match get_index(client, index).await {
                Ok(found) => Ok(Some(found)),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            }
        },
        |found: &Option<Index>| match found {
            Some(_) => PollState::Succeeded,
            None => PollState::Pending,
        },
    )
    .await?;

    found.ok_or_else(|| CognitiveError::OperationFailed {
        operation,
        detail: "index not found".into(),
    })
}

// ---------------------------------------------------------------------------
// Ingestion API
// ---------------------------------------------------------------------------

/// Start an ingestion of videos into an index.
#[tracing::instrument(
    name = "cognitive::retrieval::create_ingestion",
    skip(client, request),
    fields(index = %index, ingestion = %ingestion, videos = request.videos.len())
)]
pub async fn create_ingestion(
    client: &CognitiveClient,
    index: &str,
    ingestion: &str,
    request: &IngestionRequest,
) -> CognitiveResult<Ingestion> {
    tracing::debug!("creating ingestion");

    let path = format!("{}?{RETRIEVAL_API_VERSION}", ingestion_path(index, ingestion));
    let response = client.put(&path, request).await?;
    let created = response.json::<Ingestion>().await?;

    tracing::debug!(state = %created.state, "ingestion created");
    Ok(created)
}

/// Resubmit an existing ingestion.
#[tracing::instrument(
    name = "cognitive::retrieval::update_ingestion",
    skip(client, request),
    fields(index = %index, ingestion = %ingestion, videos = request.videos.len())
)]
pub async fn update_ingestion(
    client: &CognitiveClient,
    index: &str,
    ingestion: &str,
    request: &IngestionRequest,
) -> CognitiveResult<Ingestion> {
    tracing::debug!("updating ingestion");

    let path = format!("{}?{RETRIEVAL_API_VERSION}", ingestion_path(index, ingestion));
    let response = client.patch(&path, request).await?;
    let updated = response.json::<Ingestion>().await?;

    tracing::debug!(state = %updated.state, "ingestion updated");
    Ok(updated)
}

/// Get an ingestion and its current state.
#[tracing::instrument(
    name = "cognitive::retrieval::get_ingestion",
    skip(client),
    fields(index = %index, ingestion = %ingestion)
)]
pub async fn get_ingestion(
    client: &CognitiveClient,
    index: &str,
    ingestion: &str,
) -> CognitiveResult<Ingestion> {
    let path = format!("{}?{RETRIEVAL_API_VERSION}", ingestion_path(index, ingestion));
    let response = client.get(&path).await?;
    Ok(response.json::<Ingestion>().await?)
}

/// Returns `true` if the ingestion exists, `false` if the service answers 404.
#[tracing::instrument(
    name = "cognitive::retrieval::ingestion_exists",
    skip(client),
    fields(index = %index, ingestion = %ingestion)
)]
pub async fn ingestion_exists(
    client: &CognitiveClient,
    index: &str,
    ingestion: &str,
) -> CognitiveResult<bool> {
    match get_ingestion(client, index, ingestion).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// List the ingestions of an index, following `nextLink` across pages.
#[tracing::instrument(
    name = "cognitive::retrieval::list_ingestions",
    skip(client),
    fields(index = %index)
)]
pub async fn list_ingestions(
    client: &CognitiveClient,
    index: &str,
) -> CognitiveResult<Vec<Ingestion>> {
    let path = format!("{}/ingestions?{RETRIEVAL_API_VERSION}", index_path(index));
    let ingestions = client.get_paged::<Ingestion>(&path).await?;

    tracing::debug!(count = ingestions.len(), "listed ingestions");
    Ok(ingestions)
}

/// List the documents stored in an index, following `nextLink` across pages.
#[tracing::instrument(
    name = "cognitive::retrieval::list_documents",
    skip(client),
    fields(index = %index)
)]
pub async fn list_documents(
    client: &CognitiveClient,
    index: &str,
) -> CognitiveResult<Vec<IndexedDocument>> {
    let path = format!("{}/documents?{RETRIEVAL_API_VERSION}", index_path(index));
    let documents = client.get_paged::<IndexedDocument>(&path).await?;

    tracing::debug!(count = documents.len(), "listed documents");
    Ok(documents)
}

/// Poll an ingestion until `statuses` classifies its state as terminal.
///
/// # Errors
///
/// Returns [`CognitiveError::OperationFailed`] for a failed state and
/// [`CognitiveError::PollTimeout`] if the ingestion is still pending after
/// `options.max_wait`.
///
/// # Tracing
///
/// Emits a span named `cognitive::retrieval::wait_for_ingestion`.
#[tracing::instrument(
    name = "cognitive::retrieval::wait_for_ingestion",
    skip(client, options, statuses),
    fields(index = %index, ingestion = %ingestion)
)]
pub async fn wait_for_ingestion(
    client: &CognitiveClient,
    index: &str,
    ingestion: &str,
    options: &PollOptions,
    statuses: &StatusSet,
) -> CognitiveResult<Ingestion> {
    lro::poll_until(
        &format!("ingestion {ingestion}"),
        options,
        || get_ingestion(client, index, ingestion),
        |current: &Ingestion| statuses.classify(&current.state),
    )
    .await
}

/// Create an ingestion (unless it already exists) and wait for it to finish.
///
/// A failed ingestion is resubmitted with [`update_ingestion`] up to
/// `options.max_resubmits` times. All waits share one deadline of
/// `options.poll.max_wait` measured from the start of the call.
///
/// # Tracing
///
/// Emits a span named `cognitive::retrieval::ingest_and_wait`.
#[tracing::instrument(
    name = "cognitive::retrieval::ingest_and_wait",
    skip(client, request, options),
    fields(index = %index, ingestion = %ingestion)
)]
pub async fn ingest_and_wait(
    client: &CognitiveClient,
    index: &str,
    ingestion: &str,
    request: &IngestionRequest,
    options: &IngestOptions,
) -> CognitiveResult<Ingestion> {
    let deadline = tokio::time::Instant::now() + options.poll.max_wait;

    if ingestion_exists(client, index, ingestion).await? {
        tracing::debug!("ingestion already exists, skipping creation");
    } else {
        create_ingestion(client, index, ingestion, request).await?;
    }

    let mut resubmits = 0;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let poll = options.poll.with_max_wait(remaining);

        match wait_for_ingestion(client, index, ingestion, &poll, &options.statuses).await {
            Err(CognitiveError::OperationFailed { detail, .. })
                if resubmits < options.max_resubmits =>
            {
                resubmits += 1;
                tracing::warn!(resubmits, %detail, "ingestion failed, resubmitting");
                update_ingestion(client, index, ingestion, request).await?;
            }
            result => return result,
        }
    }
}

// ---------------------------------------------------------------------------
// Search API
// ---------------------------------------------------------------------------

/// Search the videos of an index with a natural-language query.
///
/// # Tracing
///
/// Emits a span named `cognitive::retrieval::query_by_text`.
#[tracing::instrument(
    name = "cognitive::retrieval::query_by_text",
    skip(client, query),
    fields(index = %index)
)]
pub async fn query_by_text(
    client: &CognitiveClient,
    index: &str,
    query: &SearchQuery,
) -> CognitiveResult<SearchResponse> {
    tracing::debug!("searching index");

    let path = format!("{}:queryByText?{RETRIEVAL_API_VERSION}", index_path(index));
    let response = client.post(&path, query).await?;
    let results = response.json::<SearchResponse>().await?;

    tracing::debug!(hits = results.value.len(), "search complete");
    Ok(results)
}
