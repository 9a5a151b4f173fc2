//! Custom Vision training client.
//!
//! Covers the training workflow of an image classification project: find or
//! create the project and its tags, upload tagged images, train an iteration,
//! wait for training, compare precision against earlier iterations, publish,
//! and quick-test the result.
//!
//! All calls authenticate with a training key:
//!
//! ```rust,no_run
//! use cognitive_services_core::auth::CognitiveCredential;
//! use cognitive_services_core::client::CognitiveClient;
//! use cognitive_services_vision::custom_vision::{self, training_poll_options};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CognitiveClient::builder()
//!     .endpoint("https://my-training.cognitiveservices.azure.com")
//!     .credential(CognitiveCredential::training_key("training-key"))
//!     .build()?;
//!
//! let project = custom_vision::find_project_by_name(&client, "flowers")
//!     .await?
//!     .ok_or("project not found")?;
//!
//! if let Some(iteration) = custom_vision::train_project(&client, &project.id).await? {
//!     let trained =
//!         custom_vision::wait_for_training(&client, &project.id, &iteration.id, &training_poll_options())
//!             .await?;
//!     let performance =
//!         custom_vision::get_iteration_performance(&client, &project.id, &trained.id, None).await?;
//!     let best = custom_vision::best_precision(&client, &project.id).await?;
//!     if custom_vision::should_publish(&performance, best) {
//!         custom_vision::publish_iteration(&client, &project.id, &trained.id, "classifyModel", "/subscriptions/...")
//!             .await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use cognitive_services_core::client::{encode_query, CognitiveClient, FilePart};
use cognitive_services_core::error::{CognitiveError, CognitiveResult};
use cognitive_services_core::lro::{self, PollOptions, StatusSet};
use serde::{Deserialize, Serialize};

use crate::models::CUSTOM_VISION_TRAINING_PATH;

/// Error code returned by `train` when nothing changed since the last iteration.
pub const TRAINING_NOT_NEEDED: &str = "BadRequestTrainingNotNeeded";

/// Maximum number of images accepted by one upload batch.
pub const MAX_IMAGES_PER_BATCH: usize = 64;

fn projects_path() -> String {
    format!("{CUSTOM_VISION_TRAINING_PATH}/projects")
}

fn project_path(project_id: &str) -> String {
    format!("{}/{project_id}", projects_path())
}

fn iteration_path(project_id: &str, iteration_id: &str) -> String {
    format!("{}/iterations/{iteration_id}", project_path(project_id))
}

fn with_query(path: String, query: &str) -> String {
    if query.is_empty() {
        path
    } else {
        format!("{path}?{query}")
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Project settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    #[serde(default)]
    pub domain_id: Option<String>,
    #[serde(default)]
    pub classification_type: Option<String>,
}

/// A Custom Vision project.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub settings: Option<ProjectSettings>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// Classification type of a new project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClassificationType {
    /// One tag per image.
    Multiclass,
    /// Any number of tags per image.
    Multilabel,
}

impl ClassificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Multiclass => "Multiclass",
            Self::Multilabel => "Multilabel",
        }
    }
}

/// Parameters of [`create_project`].
#[derive(Debug, Clone)]
pub struct CreateProjectRequest {
    name: String,
    description: Option<String>,
    domain_id: Option<String>,
    classification_type: Option<ClassificationType>,
}

impl CreateProjectRequest {
    pub fn builder() -> CreateProjectRequestBuilder {
        CreateProjectRequestBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn query_string(&self) -> String {
        let mut pairs = vec![("name", self.name.as_str())];
        if let Some(description) = &self.description {
            pairs.push(("description", description.as_str()));
        }
        if let Some(domain_id) = &self.domain_id {
            pairs.push(("domainId", domain_id.as_str()));
        }
        if let Some(ct) = self.classification_type {
            pairs.push(("classificationType", ct.as_str()));
        }
        encode_query(pairs)
    }
}

/// Builder for [`CreateProjectRequest`].
#[derive(Debug, Default)]
pub struct CreateProjectRequestBuilder {
    name: Option<String>,
    description: Option<String>,
    domain_id: Option<String>,
    classification_type: Option<ClassificationType>,
}

impl CreateProjectRequestBuilder {
    /// Sets the project name (required).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the domain the project is optimized for. Defaults to General.
    pub fn domain_id(mut self, domain_id: impl Into<String>) -> Self {
        self.domain_id = Some(domain_id.into());
        self
    }

    pub fn classification_type(mut self, classification_type: ClassificationType) -> Self {
        self.classification_type = Some(classification_type);
        self
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns [`CognitiveError::Builder`] if `name` is missing or empty.
    pub fn build(self) -> CognitiveResult<CreateProjectRequest> {
        let name = self
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CognitiveError::Builder("name is required".into()))?;

        Ok(CreateProjectRequest {
            name,
            description: self.description,
            domain_id: self.domain_id,
            classification_type: self.classification_type,
        })
    }
}

/// An image tag.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub tag_type: Option<String>,
    #[serde(default)]
    pub image_count: u32,
}

/// An image stored in a project.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub original_image_uri: Option<String>,
}

/// Outcome of one image in an upload batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCreateResult {
    #[serde(default)]
    pub source_url: Option<String>,
    /// `OK`, `OKDuplicate`, `ErrorImageFormat`, ...
    pub status: String,
    #[serde(default)]
    pub image: Option<Image>,
}

/// Result of an image upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCreateSummary {
    pub is_batch_successful: bool,
    #[serde(default)]
    pub images: Vec<ImageCreateResult>,
}

/// A training iteration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Iteration {
    pub id: String,
    pub name: String,
    /// `Queued`, `Training`, `Completed` or `Failed`.
    pub status: String,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub exportable: bool,
    #[serde(default)]
    pub training_type: Option<String>,
    #[serde(default)]
    pub publish_name: Option<String>,
    #[serde(default)]
    pub training_error_details: Option<String>,
    #[serde(default)]
    pub trained_at: Option<DateTime<Utc>>,
}

impl Iteration {
    /// The later of the creation and last-modification times.
    pub fn latest_activity(&self) -> DateTime<Utc> {
        self.created.max(self.last_modified)
    }
}

/// Precision and recall of one tag.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagPerformance {
    pub id: String,
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    #[serde(default)]
    pub average_precision: Option<f64>,
}

/// Precision and recall of an iteration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationPerformance {
    #[serde(default)]
    pub per_tag_performance: Vec<TagPerformance>,
    pub precision: f64,
    #[serde(default)]
    pub precision_std_deviation: f64,
    pub recall: f64,
    #[serde(default)]
    pub recall_std_deviation: f64,
    #[serde(default)]
    pub average_precision: Option<f64>,
}

/// One tag prediction.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub tag_id: String,
    pub tag_name: String,
    pub probability: f64,
}

/// Result of a quick test.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePrediction {
    pub id: String,
    pub project: String,
    pub iteration: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

impl ImagePrediction {
    /// The prediction with the highest probability.
    pub fn top(&self) -> Option<&Prediction> {
        self.predictions
            .iter()
            .max_by(|a, b| a.probability.total_cmp(&b.probability))
    }
}

// ---------------------------------------------------------------------------
// Projects and tags
// ---------------------------------------------------------------------------

/// List all projects of the training resource.
#[tracing::instrument(name = "cognitive::custom_vision::list_projects", skip(client))]
pub async fn list_projects(client: &CognitiveClient) -> CognitiveResult<Vec<Project>> {
    let response = client.get(&projects_path()).await?;
    let projects = response.json::<Vec<Project>>().await?;

    tracing::debug!(count = projects.len(), "listed projects");
    Ok(projects)
}

/// Create a project.
#[tracing::instrument(
    name = "cognitive::custom_vision::create_project",
    skip(client, request),
    fields(name = %request.name())
)]
pub async fn create_project(
    client: &CognitiveClient,
    request: &CreateProjectRequest,
) -> CognitiveResult<Project> {
    tracing::debug!("creating project");

    let path = with_query(projects_path(), &request.query_string());
    let response = client.post_empty(&path).await?;
    let project = response.json::<Project>().await?;

    tracing::debug!(project_id = %project.id, "project created");
    Ok(project)
}

/// Find a project by exact name.
#[tracing::instrument(name = "cognitive::custom_vision::find_project_by_name", skip(client))]
pub async fn find_project_by_name(
    client: &CognitiveClient,
    name: &str,
) -> CognitiveResult<Option<Project>> {
    Ok(list_projects(client)
        .await?
        .into_iter()
        .find(|p| p.name == name))
}

/// List the tags of a project, optionally as of a given iteration.
#[tracing::instrument(
    name = "cognitive::custom_vision::list_tags",
    skip(client),
    fields(project_id = %project_id)
)]
pub async fn list_tags(
    client: &CognitiveClient,
    project_id: &str,
    iteration_id: Option<&str>,
) -> CognitiveResult<Vec<Tag>> {
    let query = encode_query(iteration_id.map(|id| ("iterationId", id)));
    let path = with_query(format!("{}/tags", project_path(project_id)), &query);
    let response = client.get(&path).await?;
    Ok(response.json::<Vec<Tag>>().await?)
}

/// Create a tag in a project.
#[tracing::instrument(
    name = "cognitive::custom_vision::create_tag",
    skip(client, description),
    fields(project_id = %project_id, name = %name)
)]
pub async fn create_tag(
    client: &CognitiveClient,
    project_id: &str,
    name: &str,
    description: Option<&str>,
) -> CognitiveResult<Tag> {
    if name.is_empty() {
        return Err(CognitiveError::Builder("tag name cannot be empty".into()));
    }

    let mut pairs = vec![("name", name)];
    if let Some(description) = description {
        pairs.push(("description", description));
    }
    let path = with_query(
        format!("{}/tags", project_path(project_id)),
        &encode_query(pairs),
    );
    let response = client.post_empty(&path).await?;
    let tag = response.json::<Tag>().await?;

    tracing::debug!(tag_id = %tag.id, "tag created");
    Ok(tag)
}

/// Find a tag by exact name.
#[tracing::instrument(name = "cognitive::custom_vision::find_tag_by_name", skip(client))]
pub async fn find_tag_by_name(
    client: &CognitiveClient,
    project_id: &str,
    name: &str,
) -> CognitiveResult<Option<Tag>> {
    Ok(list_tags(client, project_id, None)
        .await?
        .into_iter()
        .find(|t| t.name == name))
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Read image files from disk for [`upload_images`].
pub async fn read_image_files<P: AsRef<Path>>(paths: &[P]) -> CognitiveResult<Vec<Bytes>> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        images.push(Bytes::from(tokio::fs::read(path).await?));
    }
    Ok(images)
}

/// Upload images and apply `tag_ids` to each of them.
///
/// Images are sent as `multipart/form-data` parts named `imageData`.
///
/// # Errors
///
/// Returns [`CognitiveError::Builder`] if `images` is empty or holds more than
/// [`MAX_IMAGES_PER_BATCH`] images.
#[tracing::instrument(
    name = "cognitive::custom_vision::upload_images",
    skip(client, images, tag_ids),
    fields(project_id = %project_id, count = images.len())
)]
pub async fn upload_images(
    client: &CognitiveClient,
    project_id: &str,
    images: &[Bytes],
    tag_ids: &[&str],
) -> CognitiveResult<ImageCreateSummary> {
    if images.is_empty() {
        return Err(CognitiveError::Builder("at least one image is required".into()));
    }
    if images.len() > MAX_IMAGES_PER_BATCH {
        return Err(CognitiveError::Builder(format!(
            "at most {MAX_IMAGES_PER_BATCH} images can be uploaded per batch, got {}",
            images.len()
        )));
    }

    let parts: Vec<FilePart> = images
        .iter()
        .enumerate()
        .map(|(i, data)| {
            FilePart::new("imageData", format!("image{i}.jpg"), data.clone())
                .content_type("image/jpeg")
        })
        .collect();

    let tags = tag_ids.join(",");
    let query = if tags.is_empty() {
        String::new()
    } else {
        encode_query([("tagIds", tags.as_str())])
    };
    let path = with_query(format!("{}/images", project_path(project_id)), &query);

    tracing::debug!("uploading images");
    let response = client.post_multipart(&path, &parts).await?;
    let summary = response.json::<ImageCreateSummary>().await?;

    if !summary.is_batch_successful {
        tracing::warn!(
            failed = summary.images.iter().filter(|i| !i.status.starts_with("OK")).count(),
            "some images were rejected"
        );
    }
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Training
// ---------------------------------------------------------------------------

/// Status vocabulary of training iterations.
pub fn training_statuses() -> StatusSet {
    StatusSet::new(["Queued", "Training"], ["Completed"], ["Failed"])
}

/// Poll options matching the training loop: check every second, up to an hour.
pub fn training_poll_options() -> PollOptions {
    PollOptions::new(Duration::from_secs(1), Duration::from_secs(60 * 60))
}

/// Queue a training iteration.
///
/// Returns `None` if the project has not changed since its last iteration.
///
/// # Tracing
///
/// Emits a span named `cognitive::custom_vision::train_project`.
#[tracing::instrument(
    name = "cognitive::custom_vision::train_project",
    skip(client),
    fields(project_id = %project_id)
)]
pub async fn train_project(
    client: &CognitiveClient,
    project_id: &str,
) -> CognitiveResult<Option<Iteration>> {
    tracing::debug!("starting training");

    let path = format!("{}/train", project_path(project_id));
    match client.post_empty(&path).await {
        Ok(response) => {
            let iteration = response.json::<Iteration>().await?;
            tracing::debug!(iteration_id = %iteration.id, status = %iteration.status, "training queued");
            Ok(Some(iteration))
        }
        Err(e) if e.code() == Some(TRAINING_NOT_NEEDED) => {
            tracing::debug!("training not needed");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Get an iteration.
#[tracing::instrument(
    name = "cognitive::custom_vision::get_iteration",
    skip(client),
    fields(project_id = %project_id, iteration_id = %iteration_id)
)]
pub async fn get_iteration(
    client: &CognitiveClient,
    project_id: &str,
    iteration_id: &str,
) -> CognitiveResult<Iteration> {
    let response = client.get(&iteration_path(project_id, iteration_id)).await?;
    Ok(response.json::<Iteration>().await?)
}

/// List the iterations of a project.
#[tracing::instrument(
    name = "cognitive::custom_vision::list_iterations",
    skip(client),
    fields(project_id = %project_id)
)]
pub async fn list_iterations(
    client: &CognitiveClient,
    project_id: &str,
) -> CognitiveResult<Vec<Iteration>> {
    let path = format!("{}/iterations", project_path(project_id));
    let response = client.get(&path).await?;
    Ok(response.json::<Vec<Iteration>>().await?)
}

/// The most recently created or modified iteration, if any.
pub fn pick_latest(iterations: &[Iteration]) -> Option<&Iteration> {
    iterations.iter().max_by_key(|i| i.latest_activity())
}

/// Fetch the most recently created or modified iteration of a project.
#[tracing::instrument(
    name = "cognitive::custom_vision::latest_iteration",
    skip(client),
    fields(project_id = %project_id)
)]
pub async fn latest_iteration(
    client: &CognitiveClient,
    project_id: &str,
) -> CognitiveResult<Option<Iteration>> {
    let iterations = list_iterations(client, project_id).await?;
    Ok(pick_latest(&iterations).cloned())
}

/// Wait until a training iteration completes.
///
/// # Errors
///
/// Returns [`CognitiveError::OperationFailed`] carrying `trainingErrorDetails`
/// if training fails.
///
/// # Tracing
///
/// Emits a span named `cognitive::custom_vision::wait_for_training`.
#[tracing::instrument(
    name = "cognitive::custom_vision::wait_for_training",
    skip(client, options),
    fields(project_id = %project_id, iteration_id = %iteration_id)
)]
pub async fn wait_for_training(
    client: &CognitiveClient,
    project_id: &str,
    iteration_id: &str,
    options: &PollOptions,
) -> CognitiveResult<Iteration> {
    let statuses = training_statuses();

    lro::poll_until(
        &format!("training iteration {iteration_id}"),
        options,
        || get_iteration(client, project_id, iteration_id),
        |iteration: &Iteration| {
            statuses.classify_with_detail(
                &iteration.status,
                iteration.training_error_details.as_deref(),
            )
        },
    )
    .await
}

/// Get the precision and recall of an iteration.
///
/// `threshold` is the probability above which a prediction counts as positive
/// (service default 0.5).
#[tracing::instrument(
    name = "cognitive::custom_vision::get_iteration_performance",
    skip(client),
    fields(project_id = %project_id, iteration_id = %iteration_id)
)]
pub async fn get_iteration_performance(
    client: &CognitiveClient,
    project_id: &str,
    iteration_id: &str,
    threshold: Option<f64>,
) -> CognitiveResult<IterationPerformance> {
    let threshold = threshold.map(|t| t.to_string());
    let query = encode_query(threshold.as_deref().map(|t| ("threshold", t)));
    let path = with_query(
        format!("{}/performance", iteration_path(project_id, iteration_id)),
        &query,
    );
    let response = client.get(&path).await?;
    Ok(response.json::<IterationPerformance>().await?)
}

/// Highest precision among the completed iterations of a project, or `0.0`.
#[tracing::instrument(
    name = "cognitive::custom_vision::best_precision",
    skip(client),
    fields(project_id = %project_id)
)]
pub async fn best_precision(client: &CognitiveClient, project_id: &str) -> CognitiveResult<f64> {
    let mut best = 0.0_f64;
    for iteration in list_iterations(client, project_id).await? {
        if iteration.status != "Completed" {
            continue;
        }
        let performance = get_iteration_performance(client, project_id, &iteration.id, None).await?;
        best = best.max(performance.precision);
    }

    tracing::debug!(best, "computed best precision");
    Ok(best)
}

/// Whether a candidate is at least as precise as the best iteration so far.
pub fn should_publish(candidate: &IterationPerformance, best_precision: f64) -> bool {
    candidate.precision >= best_precision
}

/// Publish an iteration to a prediction resource.
#[tracing::instrument(
    name = "cognitive::custom_vision::publish_iteration",
    skip(client, prediction_resource_id),
    fields(project_id = %project_id, iteration_id = %iteration_id, publish_name = %publish_name)
)]
pub async fn publish_iteration(
    client: &CognitiveClient,
    project_id: &str,
    iteration_id: &str,
    publish_name: &str,
    prediction_resource_id: &str,
) -> CognitiveResult<()> {
    tracing::debug!("publishing iteration");

    let query = encode_query([
        ("publishName", publish_name),
        ("predictionId", prediction_resource_id),
    ]);
    let path = with_query(
        format!("{}/publish", iteration_path(project_id, iteration_id)),
        &query,
    );
    client.post_empty(&path).await?;

    tracing::debug!("iteration published");
    Ok(())
}

// ---------------------------------------------------------------------------
// Quick test
// ---------------------------------------------------------------------------

/// Classify an image with a trained iteration without storing it.
///
/// Uses the default (latest) iteration when `iteration_id` is `None`.
#[tracing::instrument(
    name = "cognitive::custom_vision::quick_test_image",
    skip(client, image),
    fields(project_id = %project_id, bytes = image.len())
)]
pub async fn quick_test_image(
    client: &CognitiveClient,
    project_id: &str,
    image: Bytes,
    iteration_id: Option<&str>,
) -> CognitiveResult<ImagePrediction> {
    let query = encode_query(iteration_id.map(|id| ("iterationId", id)));
    let path = with_query(format!("{}/quicktest/image", project_path(project_id)), &query);
    let parts = [FilePart::new("imageData", "image.jpg", image).content_type("image/jpeg")];

    let response = client.post_multipart(&path, &parts).await?;
    Ok(response.json::<ImagePrediction>().await?)
}

/// Classify the image at `url` with a trained iteration.
#[tracing::instrument(
    name = "cognitive::custom_vision::quick_test_url",
    skip(client),
    fields(project_id = %project_id)
)]
pub async fn quick_test_url(
    client: &CognitiveClient,
    project_id: &str,
    url: &str,
    iteration_id: Option<&str>,
) -> CognitiveResult<ImagePrediction> {
    let query = encode_query(iteration_id.map(|id| ("iterationId", id)));
    let path = with_query(format!("{}/quicktest/url", project_path(project_id)), &query);

    let response = client.post(&path, &serde_json::json!({ "url": url })).await?;
    Ok(response.json::<ImagePrediction>().await?)
}
