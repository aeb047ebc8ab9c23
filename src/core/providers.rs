use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::core::store::{Collection, Store, StoreError};
use crate::core::stream_errors::ChatError;

/// Stored connection settings for one provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub name: String,
    pub credential: String,
    pub allowed_models: Vec<String>,
}

impl fmt::Debug for ProviderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("name", &self.name)
            .field("credential", &redact(&self.credential))
            .field("allowed_models", &self.allowed_models)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("provider '{0}' is not configured")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct ProviderRegistry {
    store: Arc<Store>,
}

impl ProviderRegistry {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn upsert(
        &self,
        name: &str,
        credential: &str,
        allowed_models: Vec<String>,
    ) -> Result<ProviderRecord, StoreError> {
        let record = ProviderRecord {
            name: name.to_string(),
            credential: credential.to_string(),
            allowed_models,
        };
        self.store.upsert(Collection::Providers, name, &record)?;
        debug!(provider = name, models = record.allowed_models.len(), "provider saved");
        Ok(record)
    }

    pub fn resolve(&self, name: &str) -> Result<ProviderRecord, RegistryError> {
        self.store
            .get(Collection::Providers, name)?
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Provider names in the order they were first configured.
    pub fn list_configured(&self) -> Result<Vec<String>, StoreError> {
        let records: Vec<ProviderRecord> = self.store.all(Collection::Providers)?;
        Ok(records.into_iter().map(|r| r.name).collect())
    }

    /// Allowed models for `name`; empty when the provider is unknown.
    pub fn models_for(&self, name: &str) -> Result<Vec<String>, StoreError> {
        match self.resolve(name) {
            Ok(record) => Ok(record.allowed_models),
            Err(RegistryError::NotFound(_)) => Ok(Vec::new()),
            Err(RegistryError::Store(err)) => Err(err),
        }
    }

    /// Replace every stored provider with `records`.
    pub fn replace_all(&self, records: &[ProviderRecord]) -> Result<(), StoreError> {
        self.store.truncate(Collection::Providers)?;
        for record in records {
            self.store
                .upsert(Collection::Providers, &record.name, record)?;
        }
        Ok(())
    }
}

/// Source of credential overrides, normally the process environment.
pub trait CredentialSource: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;
}

pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Where a provider's key is looked up and how its models are routed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderRoute {
    pub env_key: String,
    pub prefix: String,
}

pub fn route_for(provider: &str) -> ProviderRoute {
    let lower = provider.to_lowercase();
    if lower == "google" || lower == "gemini" {
        return ProviderRoute {
            env_key: "GEMINI_API_KEY".to_string(),
            prefix: "gemini".to_string(),
        };
    }
    ProviderRoute {
        env_key: format!("{}_API_KEY", provider.to_uppercase()),
        prefix: lower,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialOrigin {
    Environment,
    Registry,
}

#[derive(Clone)]
pub struct ResolvedCredentials {
    pub provider: String,
    pub prefix: String,
    pub api_key: String,
    pub origin: CredentialOrigin,
}

impl fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("provider", &self.provider)
            .field("prefix", &self.prefix)
            .field("api_key", &redact(&self.api_key))
            .field("origin", &self.origin)
            .finish()
    }
}

pub(crate) fn is_var_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A `${VAR}` or `$VAR` reference that was never expanded.
pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim_start();
    if value.starts_with("${") {
        return true;
    }
    value.match_indices('$').any(|(pos, _)| {
        let after = &value[pos + 1..];
        let name = match after.strip_prefix('{') {
            Some(braced) => braced.split_once('}').map_or("", |(name, _)| name),
            None => {
                let end = after
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                &after[..end]
            }
        };
        is_var_name(name)
    })
}

fn usable(value: &str) -> bool {
    !value.trim().is_empty() && !is_placeholder(value)
}

/// Prefer the environment override, then the stored credential.
///
/// Store failures are treated like a missing record; the caller only learns
/// that no credential could be resolved.
pub fn resolve_credentials(
    source: &dyn CredentialSource,
    registry: &ProviderRegistry,
    provider: &str,
) -> Result<ResolvedCredentials, ChatError> {
    let route = route_for(provider);

    let (api_key, origin) = match source.lookup(&route.env_key).filter(|v| usable(v)) {
        Some(key) => (key, CredentialOrigin::Environment),
        None => {
            let stored = match registry.resolve(provider) {
                Ok(record) => Some(record.credential),
                Err(RegistryError::NotFound(_)) => None,
                Err(RegistryError::Store(err)) => {
                    debug!(provider, "provider lookup failed: {err}");
                    None
                }
            };
            match stored.filter(|v| usable(v)) {
                Some(key) => (key, CredentialOrigin::Registry),
                None => {
                    return Err(ChatError::Configuration {
                        provider: provider.to_string(),
                    })
                }
            }
        }
    };

    debug!(provider, env_key = %route.env_key, ?origin, "credentials resolved");
    Ok(ResolvedCredentials {
        provider: provider.to_string(),
        prefix: route.prefix,
        api_key,
        origin,
    })
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "<redacted>".to_string()
    }
}
