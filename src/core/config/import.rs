//! Bulk provider import from a TOML file:
//!
//! ```toml
//! [providers.openai]
//! api_key = "${OPENAI_API_KEY}"
//! models = ["gpt-4o-mini", "gpt-4o"]
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::core::config::data::path_display;
use crate::core::providers::{is_var_name, CredentialSource, ProviderRecord, ProviderRegistry};
use crate::core::store::StoreError;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to read {}: {source}", path_display(.path))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse provider file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no providers defined")]
    Empty,
    #[error("provider '{0}' has no models")]
    NoModels(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Deserialize)]
struct ProvidersFile {
    #[serde(default)]
    providers: BTreeMap<String, ProviderEntry>,
}

#[derive(Debug, Deserialize)]
struct ProviderEntry {
    #[serde(default)]
    api_key: String,
    #[serde(default)]
    models: Vec<String>,
}

/// Expand `${VAR}` and `$VAR` references. Unknown variables are left as
/// written.
pub fn expand_env_vars(value: &str, source: &dyn CredentialSource) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = match after.strip_prefix('{') {
            Some(braced) => match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            },
            None => {
                let end = after
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                (&after[..end], end)
            }
        };

        if !is_var_name(name) {
            out.push('$');
            rest = after;
            continue;
        }

        match source.lookup(name) {
            Some(expanded) => out.push_str(&expanded),
            None => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    out
}

/// Parse and validate a provider file without touching the registry.
pub fn parse_providers(
    contents: &str,
    source: &dyn CredentialSource,
) -> Result<Vec<ProviderRecord>, ImportError> {
    let file: ProvidersFile = toml::from_str(contents)?;
    if file.providers.is_empty() {
        return Err(ImportError::Empty);
    }

    file.providers
        .into_iter()
        .map(|(name, entry)| {
            if entry.models.is_empty() {
                return Err(ImportError::NoModels(name));
            }
            Ok(ProviderRecord {
                credential: expand_env_vars(&entry.api_key, source),
                name,
                allowed_models: entry.models,
            })
        })
        .collect()
}

/// Replace the registry contents with the providers in `path`.
///
/// Nothing is written unless the whole file is valid.
pub fn import_providers(
    path: &Path,
    registry: &ProviderRegistry,
    source: &dyn CredentialSource,
) -> Result<usize, ImportError> {
    let contents = fs::read_to_string(path).map_err(|source| ImportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let records = parse_providers(&contents, source)?;
    registry.replace_all(&records)?;
    info!(count = records.len(), path = %path_display(path), "providers imported");
    Ok(records.len())
}
