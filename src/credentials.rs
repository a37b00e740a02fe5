//! Credential resolution
//!
//! Stored provider records are flattened into the `NAME → secret` map the
//! engine expects alongside every run request. Storage of the records is not
//! this crate's concern; [`CredentialResolver`] is the seam.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Credential name → secret, sent with each engine run request
pub type Credentials = BTreeMap<String, String>;

/// A provider configured by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub provider_id: String,
    /// Provider config, either a JSON object or the JSON string it was stored as
    #[serde(default)]
    pub config: Value,
}

impl ProviderRecord {
    pub fn new(provider_id: impl Into<String>, config: Value) -> Self {
        Self {
            provider_id: provider_id.into(),
            config,
        }
    }

    /// Parsed config object, decoding the stored string form if needed
    fn config_object(&self) -> Option<serde_json::Map<String, Value>> {
        match &self.config {
            Value::Object(obj) => Some(obj.clone()),
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(obj)) => Some(obj),
                _ => None,
            },
            _ => None,
        }
    }
}

/// `(provider_id, [(credential name, config key)])`
const PROVIDER_CREDENTIALS: &[(&str, &[(&str, &str)])] = &[
    ("openai", &[("OPENAI_API_KEY", "api_key")]),
    ("cohere", &[("COHERE_API_KEY", "api_key")]),
    ("ai21", &[("AI21_API_KEY", "api_key")]),
    (
        "azure_openai",
        &[
            ("AZURE_OPENAI_API_KEY", "api_key"),
            ("AZURE_OPENAI_ENDPOINT", "endpoint"),
        ],
    ),
    ("anthropic", &[("ANTHROPIC_API_KEY", "api_key")]),
    ("serpapi", &[("SERP_API_KEY", "api_key")]),
    ("serper", &[("SERPER_API_KEY", "api_key")]),
    ("browserlessapi", &[("BROWSERLESS_API_KEY", "api_key")]),
];

/// Flatten provider records into engine credentials.
///
/// Unknown providers and unreadable configs are skipped.
pub fn credentials_from_providers(providers: &[ProviderRecord]) -> Credentials {
    let mut credentials = Credentials::new();

    for provider in providers {
        let Some((_, keys)) = PROVIDER_CREDENTIALS
            .iter()
            .find(|(id, _)| *id == provider.provider_id)
        else {
            tracing::warn!(provider_id = %provider.provider_id, "Skipping unknown provider");
            continue;
        };

        let Some(config) = provider.config_object() else {
            tracing::warn!(provider_id = %provider.provider_id, "Skipping provider with unreadable config");
            continue;
        };

        for (credential, key) in keys.iter() {
            if let Some(secret) = config.get(*key).and_then(Value::as_str) {
                credentials.insert((*credential).to_string(), secret.to_string());
            }
        }
    }

    credentials
}

/// Resolves the credentials of the user a run is submitted for
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, user_id: &str) -> Result<Credentials>;
}

/// Resolver over an in-memory list of provider records
#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    providers: Vec<ProviderRecord>,
}

impl ProviderCredentials {
    pub fn new(providers: Vec<ProviderRecord>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl CredentialResolver for ProviderCredentials {
    async fn resolve(&self, user_id: &str) -> Result<Credentials> {
        let credentials = credentials_from_providers(&self.providers);
        tracing::debug!(user_id, count = credentials.len(), "Resolved credentials");
        Ok(credentials)
    }
}

/// Replace all but the first few characters of a secret
pub fn mask_secret(secret: &str) -> String {
    const VISIBLE: usize = 4;
    if secret.chars().count() <= VISIBLE {
        return "*".repeat(secret.chars().count());
    }
    let head: String = secret.chars().take(VISIBLE).collect();
    format!("{head}…")
}
