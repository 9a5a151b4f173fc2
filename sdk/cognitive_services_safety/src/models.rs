//! Shared types for Content Safety requests and results.

use serde::{Deserialize, Serialize};

/// API version query parameter for Content Safety requests.
pub(crate) const API_VERSION: &str = "api-version=2023-10-01";

/// Maximum length of a text analysis request, in characters.
pub const MAX_TEXT_LENGTH: usize = 10_000;

/// Harm category reported by Content Safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Hate,
    SelfHarm,
    Sexual,
    Violence,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Hate => "Hate",
            Self::SelfHarm => "SelfHarm",
            Self::Sexual => "Sexual",
            Self::Violence => "Violence",
        };
        f.write_str(name)
    }
}

/// Granularity of the returned severities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum OutputType {
    /// Severities 0, 2, 4 and 6.
    #[default]
    FourSeverityLevels,
    /// Severities 0 through 7. Text only.
    EightSeverityLevels,
}

/// Severity of one category.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CategoryAnalysis {
    pub category: Category,
    /// Absent when the service could not rate the category.
    #[serde(default)]
    pub severity: Option<u8>,
}

/// A blocklist item found in the analyzed text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlocklistMatch {
    pub blocklist_name: String,
    pub blocklist_item_id: String,
    pub blocklist_item_text: String,
}
