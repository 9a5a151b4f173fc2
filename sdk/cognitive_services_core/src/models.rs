//! Common types shared across the Cognitive Services crates.

use serde::{Deserialize, Serialize};

/// A page of results from a list endpoint.
///
/// Retrieval and document-translation list endpoints wrap items in a `value`
/// array and link to the next page with `nextLink` or `@nextLink`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(
        default,
        rename = "nextLink",
        alias = "@nextLink",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_link: Option<String>,
}

/// Error detail embedded in a status payload rather than an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerError {
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for InnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
