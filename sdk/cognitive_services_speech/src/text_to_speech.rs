//! Text-to-speech synthesis over the Speech REST API.
//!
//! [`synthesize`] wraps plain text in SSML for one voice; [`synthesize_ssml`]
//! sends caller-authored SSML as-is. Both return the encoded audio in the
//! requested [`OutputFormat`].

use std::path::Path;

use bytes::Bytes;
use cognitive_services_core::client::CognitiveClient;
use cognitive_services_core::error::{CognitiveError, CognitiveResult};
use serde::Deserialize;

const SYNTHESIS_PATH: &str = "/cognitiveservices/v1";
const VOICES_PATH: &str = "/cognitiveservices/voices/list";

/// The synthesis endpoint rejects requests without a user agent.
const USER_AGENT: &str = concat!("cognitive-services-rs/", env!("CARGO_PKG_VERSION"));

/// Maximum length of the text passed to [`SpeechRequestBuilder::text`], in characters.
pub const MAX_TEXT_LENGTH: usize = 10_000;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Audio encoding of the synthesized speech.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Riff24Khz16BitMonoPcm,
    Riff16Khz16BitMonoPcm,
    Raw16Khz16BitMonoPcm,
    Audio16Khz32KBitRateMonoMp3,
    Audio24Khz48KBitRateMonoMp3,
    Ogg24Khz16BitMonoOpus,
    Webm24Khz16BitMonoOpus,
    /// Any other `X-Microsoft-OutputFormat` value.
    Other(String),
}

impl OutputFormat {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Riff24Khz16BitMonoPcm => "riff-24khz-16bit-mono-pcm",
            Self::Riff16Khz16BitMonoPcm => "riff-16khz-16bit-mono-pcm",
            Self::Raw16Khz16BitMonoPcm => "raw-16khz-16bit-mono-pcm",
            Self::Audio16Khz32KBitRateMonoMp3 => "audio-16khz-32kbitrate-mono-mp3",
            Self::Audio24Khz48KBitRateMonoMp3 => "audio-24khz-48kbitrate-mono-mp3",
            Self::Ogg24Khz16BitMonoOpus => "ogg-24khz-16bit-mono-opus",
            Self::Webm24Khz16BitMonoOpus => "webm-24khz-16bit-mono-opus",
            Self::Other(format) => format,
        }
    }
}

/// Escape text for use in SSML content or attribute values.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Plain text to be spoken by one voice.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    text: String,
    voice: String,
    language: String,
    style: Option<String>,
    rate: Option<String>,
    output_format: OutputFormat,
}

impl SpeechRequest {
    pub fn builder() -> SpeechRequestBuilder {
        SpeechRequestBuilder::default()
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn output_format(&self) -> &OutputFormat {
        &self.output_format
    }

    /// Render the request as an SSML document.
    pub fn to_ssml(&self) -> String {
        let mut body = escape_xml(&self.text);
        if let Some(rate) = &self.rate {
            body = format!("<prosody rate='{}'>{body}</prosody>", escape_xml(rate));
        }
        if let Some(style) = &self.style {
            body = format!(
                "<mstts:express-as style='{}'>{body}</mstts:express-as>",
                escape_xml(style)
            );
        }

        format!(
            "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' \
             xmlns:mstts='https://www.w3.org/2001/mstts' xml:lang='{lang}'>\
             <voice name='{voice}'>{body}</voice></speak>",
            lang = escape_xml(&self.language),
            voice = escape_xml(&self.voice),
        )
    }
}

/// Builder for [`SpeechRequest`].
#[derive(Debug, Default)]
pub struct SpeechRequestBuilder {
    text: Option<String>,
    voice: Option<String>,
    language: Option<String>,
    style: Option<String>,
    rate: Option<String>,
    output_format: OutputFormat,
}

impl SpeechRequestBuilder {
    /// Sets the text to speak (required).
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the voice short name, e.g. `en-US-AvaMultilingualNeural` (required).
    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    /// Document language. Defaults to `en-US`.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Speaking style such as `cheerful`, for voices that list it.
    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Prosody rate such as `+20%` or `slow`.
    pub fn rate(mut self, rate: impl Into<String>) -> Self {
        self.rate = Some(rate.into());
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns [`CognitiveError::Builder`] if the text or voice is missing or
    /// empty, or the text is longer than [`MAX_TEXT_LENGTH`] characters.
    pub fn build(self) -> CognitiveResult<SpeechRequest> {
        let text = self
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CognitiveError::Builder("text is required".into()))?;
        let len = text.chars().count();
        if len > MAX_TEXT_LENGTH {
            return Err(CognitiveError::Builder(format!(
                "text exceeds {MAX_TEXT_LENGTH} characters (got {len})"
            )));
        }

        let voice = self
            .voice
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CognitiveError::Builder("voice is required".into()))?;

        Ok(SpeechRequest {
            text,
            voice,
            language: self.language.unwrap_or_else(|| "en-US".into()),
            style: self.style,
            rate: self.rate,
            output_format: self.output_format,
        })
    }
}

// ---------------------------------------------------------------------------
// Voices
// ---------------------------------------------------------------------------

/// A voice returned by [`list_voices`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Voice {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    pub short_name: String,
    pub gender: String,
    pub locale: String,
    #[serde(default)]
    pub locale_name: String,
    #[serde(default)]
    pub sample_rate_hertz: String,
    #[serde(default)]
    pub voice_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub style_list: Vec<String>,
    #[serde(default)]
    pub role_play_list: Vec<String>,
}

impl Voice {
    pub fn supports_style(&self, style: &str) -> bool {
        self.style_list.iter().any(|s| s == style)
    }
}

// ---------------------------------------------------------------------------
// API
// ---------------------------------------------------------------------------

/// Synthesize SSML into audio.
///
/// # Tracing
///
/// Emits a span named `cognitive::text_to_speech::synthesize_ssml` with field
/// `format`.
#[tracing::instrument(
    name = "cognitive::text_to_speech::synthesize_ssml",
    skip(client, ssml),
    fields(format = %format.as_str())
)]
pub async fn synthesize_ssml(
    client: &CognitiveClient,
    ssml: &str,
    format: &OutputFormat,
) -> CognitiveResult<Bytes> {
    if ssml.trim().is_empty() {
        return Err(CognitiveError::Builder("ssml cannot be empty".into()));
    }
    tracing::debug!(len = ssml.len(), "synthesizing speech");

    let response = client
        .post_raw(
            SYNTHESIS_PATH,
            "application/ssml+xml",
            ssml.to_owned(),
            &[
                ("X-Microsoft-OutputFormat", format.as_str()),
                ("User-Agent", USER_AGENT),
            ],
        )
        .await?;
    let audio = response.bytes().await?;

    tracing::debug!(bytes = audio.len(), "speech synthesized");
    Ok(audio)
}

/// Synthesize a [`SpeechRequest`] into audio.
///
/// # Tracing
///
/// Emits a span named `cognitive::text_to_speech::synthesize` with field
/// `voice`.
#[tracing::instrument(
    name = "cognitive::text_to_speech::synthesize",
    skip(client, request),
    fields(voice = %request.voice())
)]
pub async fn synthesize(client: &CognitiveClient, request: &SpeechRequest) -> CognitiveResult<Bytes> {
    synthesize_ssml(client, &request.to_ssml(), request.output_format()).await
}

/// Synthesize a [`SpeechRequest`] and write the audio to `path`.
#[tracing::instrument(
    name = "cognitive::text_to_speech::synthesize_to_file",
    skip(client, request),
    fields(path = %path.display())
)]
pub async fn synthesize_to_file(
    client: &CognitiveClient,
    request: &SpeechRequest,
    path: &Path,
) -> CognitiveResult<u64> {
    let audio = synthesize(client, request).await?;
    tokio::fs::write(path, &audio).await?;
    Ok(audio.len() as u64)
}

/// List the voices available in the client's region.
///
/// # Tracing
///
/// Emits a span named `cognitive::text_to_speech::list_voices`.
#[tracing::instrument(name = "cognitive::text_to_speech::list_voices", skip(client))]
pub async fn list_voices(client: &CognitiveClient) -> CognitiveResult<Vec<Voice>> {
    let voices = client.get(VOICES_PATH).await?.json::<Vec<Voice>>().await?;

    tracing::debug!(count = voices.len(), "listed voices");
    Ok(voices)
}

/// Voices for one locale, matched case-insensitively (`en-us` finds `en-US`).
pub fn voices_for_locale<'a>(voices: &'a [Voice], locale: &str) -> Vec<&'a Voice> {
    voices
        .iter()
        .filter(|v| v.locale.eq_ignore_ascii_case(locale))
        .collect()
}
