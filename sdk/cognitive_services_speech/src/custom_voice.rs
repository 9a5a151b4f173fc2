//! Custom neural voice projects and voice talent consents.
//!
//! A consent records the voice talent's permission to build a voice from
//! their recordings. Creating one starts a long-running check of the consent
//! audio; [`wait_for_consent`] polls it until the service reaches a verdict.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cognitive_services_core::client::CognitiveClient;
//! use cognitive_services_core::lro::PollOptions;
//! use cognitive_services_speech::custom_voice::{self, ConsentRequest, PROFESSIONAL_VOICE};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CognitiveClient::builder().env_prefix("SPEECH").build()?;
//!
//! if !custom_voice::project_exists(&client, "brand-voice").await? {
//!     custom_voice::create_project(&client, "brand-voice", PROFESSIONAL_VOICE, Some("Brand voice"))
//!         .await?;
//! }
//!
//! let consent = ConsentRequest::builder()
//!     .project_id("brand-voice")
//!     .voice_talent_name("Sam Doe")
//!     .company_name("Contoso")
//!     .audio_url("https://example.blob.core.windows.net/consent/sam.wav")
//!     .locale("en-US")
//!     .build()?;
//! custom_voice::create_consent(&client, "sam-consent", &consent).await?;
//! let done = custom_voice::wait_for_consent(&client, "sam-consent", &PollOptions::default()).await?;
//! println!("consent {}: {}", done.id, done.status);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use cognitive_services_core::client::{encode_query, CognitiveClient};
use cognitive_services_core::error::{CognitiveError, CognitiveResult};
use cognitive_services_core::lro::{self, PollOptions, StatusSet};
use serde::{Deserialize, Serialize};

/// API version of custom voice requests.
pub const API_VERSION: &str = "2024-02-01-preview";

/// Project kind for professional voices trained on studio recordings.
pub const PROFESSIONAL_VOICE: &str = "ProfessionalVoice";

/// Project kind for personal voices built from a short prompt.
pub const PERSONAL_VOICE: &str = "PersonalVoice";

fn query() -> String {
    encode_query([("api-version", API_VERSION)])
}

fn project_path(id: &str) -> String {
    format!("/customvoice/projects/{id}?{}", query())
}

fn consent_path(id: &str) -> String {
    format!("/customvoice/consents/{id}?{}", query())
}

fn require_id(what: &str, id: &str) -> CognitiveResult<()> {
    if id.is_empty() {
        return Err(CognitiveError::Builder(format!("{what} id cannot be empty")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

/// A custom voice project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing)]
    pub created_date_time: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct NewProject<'a> {
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

/// Create (or replace) a project.
///
/// # Tracing
///
/// Emits a span named `cognitive::custom_voice::create_project`.
#[tracing::instrument(
    name = "cognitive::custom_voice::create_project",
    skip(client, description),
    fields(project = %id, kind = %kind)
)]
pub async fn create_project(
    client: &CognitiveClient,
    id: &str,
    kind: &str,
    description: Option<&str>,
) -> CognitiveResult<Project> {
    require_id("project", id)?;
    if kind.is_empty() {
        return Err(CognitiveError::Builder("project kind cannot be empty".into()));
    }
    tracing::debug!("creating project");

    let body = NewProject { kind, description };
    let response = client.put(&project_path(id), &body).await?;
    Ok(response.json::<Project>().await?)
}

#[tracing::instrument(
    name = "cognitive::custom_voice::get_project",
    skip(client),
    fields(project = %id)
)]
pub async fn get_project(client: &CognitiveClient, id: &str) -> CognitiveResult<Project> {
    require_id("project", id)?;
    Ok(client.get(&project_path(id)).await?.json::<Project>().await?)
}

/// Whether a project exists. A 404 is `false`; other errors propagate.
#[tracing::instrument(
    name = "cognitive::custom_voice::project_exists",
    skip(client),
    fields(project = %id)
)]
pub async fn project_exists(client: &CognitiveClient, id: &str) -> CognitiveResult<bool> {
    match get_project(client, id).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// List every project, following `nextLink` across pages.
#[tracing::instrument(name = "cognitive::custom_voice::list_projects", skip(client))]
pub async fn list_projects(client: &CognitiveClient) -> CognitiveResult<Vec<Project>> {
    let path = format!("/customvoice/projects?{}", query());
    let projects = client.get_paged::<Project>(&path).await?;

    tracing::debug!(count = projects.len(), "listed projects");
    Ok(projects)
}

/// First listed project of the given kind.
#[tracing::instrument(
    name = "cognitive::custom_voice::first_project_of_kind",
    skip(client),
    fields(kind = %kind)
)]
pub async fn first_project_of_kind(
    client: &CognitiveClient,
    kind: &str,
) -> CognitiveResult<Option<Project>> {
    Ok(list_projects(client)
        .await?
        .into_iter()
        .find(|p| p.kind == kind))
}

/// Delete a project. A project that still holds consents or models is
/// rejected by the service.
#[tracing::instrument(
    name = "cognitive::custom_voice::delete_project",
    skip(client),
    fields(project = %id)
)]
pub async fn delete_project(client: &CognitiveClient, id: &str) -> CognitiveResult<()> {
    require_id("project", id)?;
    tracing::debug!("deleting project");

    client.delete(&project_path(id)).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Consents
// ---------------------------------------------------------------------------

/// Body of [`create_consent`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRequest {
    project_id: String,
    voice_talent_name: String,
    company_name: String,
    audio_url: String,
    locale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl ConsentRequest {
    pub fn builder() -> ConsentRequestBuilder {
        ConsentRequestBuilder::default()
    }
}

/// Builder for [`ConsentRequest`].
#[derive(Debug, Default)]
pub struct ConsentRequestBuilder {
    project_id: Option<String>,
    voice_talent_name: Option<String>,
    company_name: Option<String>,
    audio_url: Option<String>,
    locale: Option<String>,
    description: Option<String>,
}

impl ConsentRequestBuilder {
    pub fn project_id(mut self, id: impl Into<String>) -> Self {
        self.project_id = Some(id.into());
        self
    }

    /// Name of the person whose voice is used.
    pub fn voice_talent_name(mut self, name: impl Into<String>) -> Self {
        self.voice_talent_name = Some(name.into());
        self
    }

    pub fn company_name(mut self, name: impl Into<String>) -> Self {
        self.company_name = Some(name.into());
        self
    }

    /// Public or SAS URL of the recorded consent statement.
    pub fn audio_url(mut self, url: impl Into<String>) -> Self {
        self.audio_url = Some(url.into());
        self
    }

    /// Locale of the consent statement, e.g. `en-US`.
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns [`CognitiveError::Builder`] naming the first missing or empty
    /// field among project id, voice talent, company, audio URL and locale.
    pub fn build(self) -> CognitiveResult<ConsentRequest> {
        fn required(field: &str, value: Option<String>) -> CognitiveResult<String> {
            value
                .filter(|v| !v.is_empty())
                .ok_or_else(|| CognitiveError::Builder(format!("{field} is required")))
        }

        Ok(ConsentRequest {
            project_id: required("project_id", self.project_id)?,
            voice_talent_name: required("voice_talent_name", self.voice_talent_name)?,
            company_name: required("company_name", self.company_name)?,
            audio_url: required("audio_url", self.audio_url)?,
            locale: required("locale", self.locale)?,
            description: self.description,
        })
    }
}

/// A voice talent consent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consent {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub project_id: String,
    pub voice_talent_name: String,
    pub company_name: String,
    #[serde(default)]
    pub audio_url: Option<String>,
    pub locale: String,
    /// `NotStarted`, `Running`, `Succeeded` or `Failed`.
    pub status: String,
    #[serde(default)]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_action_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: Option<ConsentProperties>,
}

/// Failure detail of a consent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentProperties {
    #[serde(default)]
    pub failure_reason: Option<String>,
}

/// Status classification of consent processing.
pub fn consent_statuses() -> StatusSet {
    StatusSet::new(["NotStarted", "Running"], ["Succeeded"], ["Failed"])
}

/// Create a consent and start checking its audio.
///
/// # Tracing
///
/// Emits a span named `cognitive::custom_voice::create_consent`.
#[tracing::instrument(
    name = "cognitive::custom_voice::create_consent",
    skip(client, request),
    fields(consent = %id, project = %request.project_id)
)]
pub async fn create_consent(
    client: &CognitiveClient,
    id: &str,
    request: &ConsentRequest,
) -> CognitiveResult<Consent> {
    require_id("consent", id)?;
    tracing::debug!("creating consent");

    let response = client.put(&consent_path(id), request).await?;
    let consent = response.json::<Consent>().await?;

    tracing::debug!(status = %consent.status, "consent created");
    Ok(consent)
}

#[tracing::instrument(
    name = "cognitive::custom_voice::get_consent",
    skip(client),
    fields(consent = %id)
)]
pub async fn get_consent(client: &CognitiveClient, id: &str) -> CognitiveResult<Consent> {
    require_id("consent", id)?;
    Ok(client.get(&consent_path(id)).await?.json::<Consent>().await?)
}

/// Whether a consent exists. A 404 is `false`; other errors propagate.
#[tracing::instrument(
    name = "cognitive::custom_voice::consent_exists",
    skip(client),
    fields(consent = %id)
)]
pub async fn consent_exists(client: &CognitiveClient, id: &str) -> CognitiveResult<bool> {
    match get_consent(client, id).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// List every consent, following `nextLink` across pages.
#[tracing::instrument(name = "cognitive::custom_voice::list_consents", skip(client))]
pub async fn list_consents(client: &CognitiveClient) -> CognitiveResult<Vec<Consent>> {
    let path = format!("/customvoice/consents?{}", query());
    let consents = client.get_paged::<Consent>(&path).await?;

    tracing::debug!(count = consents.len(), "listed consents");
    Ok(consents)
}

#[tracing::instrument(
    name = "cognitive::custom_voice::delete_consent",
    skip(client),
    fields(consent = %id)
)]
pub async fn delete_consent(client: &CognitiveClient, id: &str) -> CognitiveResult<()> {
    require_id("consent", id)?;
    tracing::debug!("deleting consent");

    client.delete(&consent_path(id)).await?;
    Ok(())
}

/// Poll a consent until it succeeds or fails.
///
/// # Errors
///
/// Returns [`CognitiveError::OperationFailed`] carrying the failure reason for
/// a failed consent, and [`CognitiveError::PollTimeout`] if it is still being
/// processed after `options.max_wait`.
#[tracing::instrument(
    name = "cognitive::custom_voice::wait_for_consent",
    skip(client, options),
    fields(consent = %id)
)]
pub async fn wait_for_consent(
    client: &CognitiveClient,
    id: &str,
    options: &PollOptions,
) -> CognitiveResult<Consent> {
    let statuses = consent_statuses();
    lro::poll_until(
        &format!("consent {id}"),
        options,
        || get_consent(client, id),
        |consent: &Consent| {
            let reason = consent
                .properties
                .as_ref()
                .and_then(|p| p.failure_reason.as_deref());
            statuses.classify_with_detail(&consent.status, reason)
        },
    )
    .await
}
