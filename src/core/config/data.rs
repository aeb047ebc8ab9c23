use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::routes::Route;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Directory holding the document store. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
    /// Directory of `<model>.json` / `generic.json` tokenizer files
    pub tokenizer_dir: Option<PathBuf>,
    pub default_provider: Option<String>,
    /// Provider name -> model used when none is given
    #[serde(default)]
    pub default_models: BTreeMap<String, String>,
    pub default_persona: Option<String>,
    /// Extra routing prefixes, or replacements for built-in ones
    #[serde(default)]
    pub custom_routes: Vec<Route>,
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub log_filter: Option<String>,
}

pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    pub fn default_model_for(&self, provider: &str) -> Option<&str> {
        self.default_models
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(provider))
            .map(|(_, model)| model.as_str())
    }

    /// Provider keys are stored lowercased; lookups ignore case.
    pub fn set_default_model(&mut self, provider: &str, model: &str) {
        self.default_models
            .retain(|name, _| !name.eq_ignore_ascii_case(provider));
        self.default_models
            .insert(provider.to_lowercase(), model.to_string());
    }

    pub fn add_custom_route(&mut self, route: Route) {
        self.custom_routes
            .retain(|r| !r.prefix.eq_ignore_ascii_case(&route.prefix));
        self.custom_routes.push(route);
    }

    pub fn remove_custom_route(&mut self, prefix: &str) {
        self.custom_routes
            .retain(|r| !r.prefix.eq_ignore_ascii_case(prefix));
    }
}
