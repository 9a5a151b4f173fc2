#![doc = include_str!("../README.md")]

pub mod auth;
pub mod client;
pub mod error;
pub mod lro;
pub mod models;

/// Mock-server helpers for sibling crates' tests.
#[cfg(feature = "test-support")]
pub mod test_support;

pub use error::CognitiveError;
