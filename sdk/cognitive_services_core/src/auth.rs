use crate::error::{CognitiveError, CognitiveResult};
use secrecy::{ExposeSecret, SecretString};

/// Header carrying a Cognitive Services resource key.
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Header carrying the Azure region of a multi-region resource key.
pub const SUBSCRIPTION_REGION_HEADER: &str = "Ocp-Apim-Subscription-Region";

/// Header carrying a Custom Vision training key.
pub const TRAINING_KEY_HEADER: &str = "Training-Key";

/// Credential types accepted by Cognitive Services endpoints.
#[derive(Clone)]
pub enum CognitiveCredential {
    /// Resource key sent as `Ocp-Apim-Subscription-Key`.
    ///
    /// Translator requires the resource region alongside a multi-service key.
    SubscriptionKey {
        key: SecretString,
        region: Option<String>,
    },

    /// Custom Vision training key sent as `Training-Key`.
    TrainingKey(SecretString),
}

impl CognitiveCredential {
    /// Create a subscription-key credential without a region.
    pub fn subscription_key(key: impl Into<String>) -> Self {
        Self::SubscriptionKey {
            key: SecretString::from(key.into()),
            region: None,
        }
    }

    /// Create a subscription-key credential bound to a resource region.
    pub fn subscription_key_with_region(key: impl Into<String>, region: impl Into<String>) -> Self {
        Self::SubscriptionKey {
            key: SecretString::from(key.into()),
            region: Some(region.into()),
        }
    }

    /// Create a Custom Vision training-key credential.
    pub fn training_key(key: impl Into<String>) -> Self {
        Self::TrainingKey(SecretString::from(key.into()))
    }

    /// Read a subscription key from `<PREFIX>_KEY` and an optional region from
    /// `<PREFIX>_REGION`.
    ///
    /// # Errors
    ///
    /// Returns [`CognitiveError::MissingConfig`] if `<PREFIX>_KEY` is unset or empty.
    pub fn from_env(prefix: &str) -> CognitiveResult<Self> {
        let key_var = format!("{prefix}_KEY");
        let key = match std::env::var(&key_var) {
            Ok(key) if !key.is_empty() => key,
            _ => {
                return Err(CognitiveError::MissingConfig(format!(
                    "credential is required. Set it via builder or {key_var} env var."
                )))
            }
        };

        let region = std::env::var(format!("{prefix}_REGION"))
            .ok()
            .filter(|r| !r.is_empty());

        Ok(Self::SubscriptionKey {
            key: SecretString::from(key),
            region,
        })
    }

    /// Attach the authentication headers for this credential to a request.
    pub(crate) fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::SubscriptionKey { key, region } => {
                let request = request.header(SUBSCRIPTION_KEY_HEADER, key.expose_secret());
                match region {
                    Some(region) => request.header(SUBSCRIPTION_REGION_HEADER, region),
                    None => request,
                }
            }
            Self::TrainingKey(key) => request.header(TRAINING_KEY_HEADER, key.expose_secret()),
        }
    }
}

impl std::fmt::Debug for CognitiveCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubscriptionKey { region, .. } => write!(
                f,
                "CognitiveCredential::SubscriptionKey(****, region: {region:?})"
            ),
            Self::TrainingKey(_) => write!(f, "CognitiveCredential::TrainingKey(****)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn debug_does_not_leak_keys() {
        let cred = CognitiveCredential::subscription_key_with_region("super-secret", "eastus");
        let debug = format!("{cred:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("eastus"));

        let cred = CognitiveCredential::training_key("training-secret");
        assert!(!format!("{cred:?}").contains("training-secret"));
    }

    #[test]
    #[serial]
    fn from_env_reads_key_and_region() {
        std::env::set_var("CS_AUTH_TEST_KEY", "env-key");
        std::env::set_var("CS_AUTH_TEST_REGION", "westeurope");

        let cred = CognitiveCredential::from_env("CS_AUTH_TEST").expect("should read env");
        match cred {
            CognitiveCredential::SubscriptionKey { key, region } => {
                assert_eq!(key.expose_secret(), "env-key");
                assert_eq!(region.as_deref(), Some("westeurope"));
            }
            other => panic!("expected subscription key, got {other:?}"),
        }

        std::env::remove_var("CS_AUTH_TEST_KEY");
        std::env::remove_var("CS_AUTH_TEST_REGION");
    }

    #[test]
    #[serial]
    fn from_env_requires_key() {
        std::env::remove_var("CS_AUTH_MISSING_KEY");

        let err = CognitiveCredential::from_env("CS_AUTH_MISSING").expect_err("no key set");
        assert!(matches!(err, CognitiveError::MissingConfig(_)));
        assert!(err.to_string().contains("CS_AUTH_MISSING_KEY"));
    }
}
