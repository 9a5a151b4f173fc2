//! Shared constants for the Computer Vision and Custom Vision services.

/// API version query parameter for video retrieval requests.
pub(crate) const RETRIEVAL_API_VERSION: &str = "api-version=2023-05-01-preview";

/// API version of Image Analysis 4.0 requests.
pub(crate) const IMAGE_ANALYSIS_API_VERSION: &str = "2024-02-01";

/// Path prefix for Custom Vision training requests.
pub(crate) const CUSTOM_VISION_TRAINING_PATH: &str = "/customvision/v3.4-preview/training";
