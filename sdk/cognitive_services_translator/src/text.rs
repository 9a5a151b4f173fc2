//! Text translation client for Azure Translator.
//!
//! All calls go to the global or regional Translator text endpoint
//! (`https://api.cognitive.microsofttranslator.com`) and send the
//! subscription region alongside the key.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> cognitive_services_core::error::CognitiveResult<()> {
//! use cognitive_services_core::client::CognitiveClient;
//! use cognitive_services_translator::text::{translate, TranslateOptions};
//!
//! let client = CognitiveClient::builder().env_prefix("TRANSLATOR").build()?;
//! let options = TranslateOptions::builder().to("fr").to("de").build()?;
//! let results = translate(&client, &["Hello, world"], &options).await?;
//! for t in &results[0].translations {
//!     println!("{}: {}", t.to, t.text);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use cognitive_services_core::client::{encode_query, CognitiveClient};
use cognitive_services_core::error::{CognitiveError, CognitiveResult};
use serde::{Deserialize, Serialize};

use crate::models::{text_items, TEXT_API_VERSION};

// ---------------------------------------------------------------------------
// Translate
// ---------------------------------------------------------------------------

/// Whether input text is plain or HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextType {
    #[default]
    Plain,
    Html,
}

impl TextType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Html => "html",
        }
    }
}

/// Options for [`translate`].
#[derive(Debug, Clone)]
pub struct TranslateOptions {
    to: Vec<String>,
    from: Option<String>,
    text_type: TextType,
    category: Option<String>,
}

impl TranslateOptions {
    pub fn builder() -> TranslateOptionsBuilder {
        TranslateOptionsBuilder::default()
    }

    pub fn to(&self) -> &[String] {
        &self.to
    }

    fn query_string(&self) -> String {
        let mut pairs = vec![("api-version", TEXT_API_VERSION)];
        pairs.extend(self.to.iter().map(|lang| ("to", lang.as_str())));
        if let Some(from) = &self.from {
            pairs.push(("from", from.as_str()));
        }
        if self.text_type != TextType::Plain {
            pairs.push(("textType", self.text_type.as_str()));
        }
        if let Some(category) = &self.category {
            pairs.push(("category", category.as_str()));
        }
        encode_query(pairs)
    }
}

/// Builder for [`TranslateOptions`].
#[derive(Debug, Default)]
pub struct TranslateOptionsBuilder {
    to: Vec<String>,
    from: Option<String>,
    text_type: TextType,
    category: Option<String>,
}

impl TranslateOptionsBuilder {
    /// Adds a target language. At least one is required.
    pub fn to(mut self, language: impl Into<String>) -> Self {
        self.to.push(language.into());
        self
    }

    /// Sets the source language. Detected automatically when unset.
    pub fn from(mut self, language: impl Into<String>) -> Self {
        self.from = Some(language.into());
        self
    }

    pub fn text_type(mut self, text_type: TextType) -> Self {
        self.text_type = text_type;
        self
    }

    /// Sets a custom translator category id.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Builds the options.
    ///
    /// # Errors
    ///
    /// Returns [`CognitiveError::Builder`] if no target language was given or a
    /// target is empty.
    pub fn build(self) -> CognitiveResult<TranslateOptions> {
        if self.to.is_empty() {
            return Err(CognitiveError::Builder(
                "at least one target language is required".into(),
            ));
        }
        if self.to.iter().any(String::is_empty) {
            return Err(CognitiveError::Builder("target language cannot be empty".into()));
        }

        Ok(TranslateOptions {
            to: self.to,
            from: self.from,
            text_type: self.text_type,
            category: self.category,
        })
    }
}

/// Language detected for an input whose source language was not given.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectedLanguage {
    pub language: String,
    pub score: f64,
}

/// One translation of an input text.
#[derive(Debug, Clone, Deserialize)]
pub struct Translation {
    pub text: String,
    pub to: String,
}

/// Translations of one input text.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateResult {
    #[serde(default)]
    pub detected_language: Option<DetectedLanguage>,
    pub translations: Vec<Translation>,
}

/// Translate texts into each target language of `options`.
///
/// Results are returned in input order.
///
/// # Tracing
///
/// Emits a span named `cognitive::translator::translate`.
#[tracing::instrument(
    name = "cognitive::translator::translate",
    skip(client, texts, options),
    fields(texts = texts.len(), targets = options.to().len())
)]
pub async fn translate(
    client: &CognitiveClient,
    texts: &[&str],
    options: &TranslateOptions,
) -> CognitiveResult<Vec<TranslateResult>> {
    let body = text_items(texts)?;
    tracing::debug!("translating texts");

    let path = format!("/translate?{}", options.query_string());
    let response = client.post(&path, &body).await?;
    let results = response.json::<Vec<TranslateResult>>().await?;

    tracing::debug!(results = results.len(), "translation complete");
    Ok(results)
}

// ---------------------------------------------------------------------------
// Detect
// ---------------------------------------------------------------------------

/// Alternative language candidate of a detection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageAlternative {
    pub language: String,
    pub score: f64,
    #[serde(default)]
    pub is_translation_supported: bool,
    #[serde(default)]
    pub is_transliteration_supported: bool,
}

/// Language detected for one input text.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResult {
    pub language: String,
    pub score: f64,
    #[serde(default)]
    pub is_translation_supported: bool,
    #[serde(default)]
    pub is_transliteration_supported: bool,
    #[serde(default)]
    pub alternatives: Vec<LanguageAlternative>,
}

/// Detect the language of each text.
#[tracing::instrument(
    name = "cognitive::translator::detect",
    skip(client, texts),
    fields(texts = texts.len())
)]
pub async fn detect(client: &CognitiveClient, texts: &[&str]) -> CognitiveResult<Vec<DetectResult>> {
    let body = text_items(texts)?;

    let path = format!("/detect?{}", encode_query([("api-version", TEXT_API_VERSION)]));
    let response = client.post(&path, &body).await?;
    Ok(response.json::<Vec<DetectResult>>().await?)
}

// ---------------------------------------------------------------------------
// Transliterate
// ---------------------------------------------------------------------------

/// Text converted to another script.
#[derive(Debug, Clone, Deserialize)]
pub struct TransliterateResult {
    pub text: String,
    pub script: String,
}

/// Convert texts in `language` from one script to another.
///
/// # Tracing
///
/// Emits a span named `cognitive::translator::transliterate`.
#[tracing::instrument(
    name = "cognitive::translator::transliterate",
    skip(client, texts),
    fields(texts = texts.len())
)]
pub async fn transliterate(
    client: &CognitiveClient,
    texts: &[&str],
    language: &str,
    from_script: &str,
    to_script: &str,
) -> CognitiveResult<Vec<TransliterateResult>> {
    if language.is_empty() || from_script.is_empty() || to_script.is_empty() {
        return Err(CognitiveError::Builder(
            "language, from_script and to_script are required".into(),
        ));
    }
    let body = text_items(texts)?;

    let query = encode_query([
        ("api-version", TEXT_API_VERSION),
        ("language", language),
        ("fromScript", from_script),
        ("toScript", to_script),
    ]);
    let response = client.post(&format!("/transliterate?{query}"), &body).await?;
    Ok(response.json::<Vec<TransliterateResult>>().await?)
}

// ---------------------------------------------------------------------------
// Languages
// ---------------------------------------------------------------------------

/// Default scope of [`languages`].
pub const ALL_LANGUAGE_SCOPES: &str = "translation,transliteration,dictionary";

/// A language supported for translation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationLanguage {
    pub name: String,
    pub native_name: String,
    #[serde(default)]
    pub dir: Option<String>,
}

/// Languages supported by the Translator, keyed by language code.
///
/// Transliteration and dictionary entries are kept as raw JSON; their shapes
/// are nested per script or per target language.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupportedLanguages {
    #[serde(default)]
    pub translation: HashMap<String, TranslationLanguage>,
    #[serde(default)]
    pub transliteration: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub dictionary: HashMap<String, serde_json::Value>,
}

/// List supported languages for a comma-separated `scope`.
///
/// An empty scope means [`ALL_LANGUAGE_SCOPES`].
#[tracing::instrument(name = "cognitive::translator::languages", skip(client))]
pub async fn languages(client: &CognitiveClient, scope: &str) -> CognitiveResult<SupportedLanguages> {
    let scope = if scope.is_empty() { ALL_LANGUAGE_SCOPES } else { scope };
    let query = encode_query([("api-version", TEXT_API_VERSION), ("scope", scope)]);

    let response = client.get(&format!("/languages?{query}")).await?;
    let supported = response.json::<SupportedLanguages>().await?;

    tracing::debug!(
        translation = supported.translation.len(),
        "fetched supported languages"
    );
    Ok(supported)
}

// ---------------------------------------------------------------------------
// Dictionary
// ---------------------------------------------------------------------------

/// A reverse translation of a dictionary entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackTranslation {
    pub normalized_text: String,
    pub display_text: String,
    #[serde(default)]
    pub num_examples: u32,
    #[serde(default)]
    pub frequency_count: u32,
}

/// One alternative translation of a dictionary lookup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryTranslation {
    pub normalized_target: String,
    pub display_target: String,
    pub pos_tag: String,
    pub confidence: f64,
    #[serde(default)]
    pub prefix_word: String,
    #[serde(default)]
    pub back_translations: Vec<BackTranslation>,
}

/// Dictionary lookup result for one input term.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryLookupResult {
    pub normalized_source: String,
    pub display_source: String,
    #[serde(default)]
    pub translations: Vec<DictionaryTranslation>,
}

/// Look up alternative translations of single words or phrases.
#[tracing::instrument(
    name = "cognitive::translator::dictionary_lookup",
    skip(client, texts),
    fields(texts = texts.len())
)]
pub async fn dictionary_lookup(
    client: &CognitiveClient,
    texts: &[&str],
    from: &str,
    to: &str,
) -> CognitiveResult<Vec<DictionaryLookupResult>> {
    if from.is_empty() || to.is_empty() {
        return Err(CognitiveError::Builder("from and to are required".into()));
    }
    let body = text_items(texts)?;

    let query = encode_query([("api-version", TEXT_API_VERSION), ("from", from), ("to", to)]);
    let response = client.post(&format!("/dictionary/lookup?{query}"), &body).await?;
    Ok(response.json::<Vec<DictionaryLookupResult>>().await?)
}

/// A term and one of its translations, as input to [`dictionary_examples`].
#[derive(Debug, Clone, Serialize)]
pub struct DictionaryPair {
    #[serde(rename = "Text")]
    pub text: String,
    #[serde(rename = "Translation")]
    pub translation: String,
}

impl DictionaryPair {
    pub fn new(text: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            translation: translation.into(),
        }
    }
}

/// A sentence pair showing a term in context.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryExample {
    pub source_prefix: String,
    pub source_term: String,
    pub source_suffix: String,
    pub target_prefix: String,
    pub target_term: String,
    pub target_suffix: String,
}

/// Usage examples for one term and translation pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryExamplesResult {
    pub normalized_source: String,
    pub normalized_target: String,
    #[serde(default)]
    pub examples: Vec<DictionaryExample>,
}

impl DictionaryExample {
    /// The source sentence with the term in place.
    pub fn source_sentence(&self) -> String {
        format!("{}{}{}", self.source_prefix, self.source_term, self.source_suffix)
    }

    /// The target sentence with the term in place.
    pub fn target_sentence(&self) -> String {
        format!("{}{}{}", self.target_prefix, self.target_term, self.target_suffix)
    }
}

/// Fetch example sentences for term and translation pairs.
#[tracing::instrument(
    name = "cognitive::translator::dictionary_examples",
    skip(client, pairs),
    fields(pairs = pairs.len())
)]
pub async fn dictionary_examples(
    client: &CognitiveClient,
    pairs: &[DictionaryPair],
    from: &str,
    to: &str,
) -> CognitiveResult<Vec<DictionaryExamplesResult>> {
    if pairs.is_empty() {
        return Err(CognitiveError::Builder("at least one pair is required".into()));
    }
    if from.is_empty() || to.is_empty() {
        return Err(CognitiveError::Builder("from and to are required".into()));
    }

    let query = encode_query([("api-version", TEXT_API_VERSION), ("from", from), ("to", to)]);
    let response = client.post(&format!("/dictionary/examples?{query}"), pairs).await?;
    Ok(response.json::<Vec<DictionaryExamplesResult>>().await?)
}
