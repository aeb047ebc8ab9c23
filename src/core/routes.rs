//! Routing table for the HTTP completion transport
//!
//! Maps the routing prefix of a routed model identifier (`"openai/gpt-4o"`)
//! to an endpoint. Built-in routes are embedded from builtin_routes.toml at
//! build time; custom routes from the config file override them by prefix.

use serde::{Deserialize, Serialize};

use crate::core::providers::route_for;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub prefix: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub base_url: String,
    #[serde(default)]
    pub mode: Option<String>,
    /// Local inference server: no per-token billing.
    #[serde(default)]
    pub local: bool,
}

#[derive(Debug, Deserialize)]
struct BuiltinRoutesConfig {
    routes: Vec<Route>,
}

impl Route {
    /// Get the authentication mode for this route
    pub fn auth_mode(&self) -> &str {
        self.mode.as_deref().unwrap_or("openai")
    }

    /// Check if this route uses Anthropic-style authentication
    pub fn is_anthropic_mode(&self) -> bool {
        self.auth_mode() == "anthropic"
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.prefix)
    }

    /// Join an endpoint path onto the base URL without doubling slashes.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Add this route's authentication headers to a request.
    pub fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        api_key: &str,
    ) -> reqwest::RequestBuilder {
        if self.is_anthropic_mode() {
            return request
                .header("x-api-key", api_key)
                .header("anthropic-version", "2023-06-01");
        }
        request.header("Authorization", format!("Bearer {api_key}"))
    }
}

/// Load built-in routes from the embedded configuration
pub fn load_builtin_routes() -> Vec<Route> {
    const CONFIG_CONTENT: &str = include_str!("../builtin_routes.toml");

    let config: BuiltinRoutesConfig =
        toml::from_str(CONFIG_CONTENT).expect("Failed to parse builtin_routes.toml");

    config.routes
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RouteTable {
    pub fn builtin() -> Self {
        Self {
            routes: load_builtin_routes(),
        }
    }

    /// Built-in routes with `custom` layered on top; a custom route replaces
    /// the built-in one with the same prefix.
    pub fn with_custom(custom: &[Route]) -> Self {
        let mut table = Self::builtin();
        for route in custom {
            match table
                .routes
                .iter_mut()
                .find(|r| r.prefix.eq_ignore_ascii_case(&route.prefix))
            {
                Some(existing) => *existing = route.clone(),
                None => table.routes.push(route.clone()),
            }
        }
        table
    }

    /// Find a route by prefix (case-insensitive)
    pub fn find(&self, prefix: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| r.prefix.eq_ignore_ascii_case(prefix))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Whether `provider` is served by a local inference route, which is
    /// never billed.
    pub fn is_local(&self, provider: &str) -> bool {
        self.find(&route_for(provider).prefix)
            .is_some_and(|route| route.local)
    }
}

/// Build the provider-prefixed model string handed to the transport.
pub fn routed_model(prefix: &str, model: &str) -> String {
    format!("{prefix}/{model}")
}

/// Split a routed model identifier at its first `/`. Model names may contain
/// further slashes (`openrouter/meta-llama/llama-3-8b`).
pub fn split_routed_model(routed: &str) -> Option<(&str, &str)> {
    routed
        .split_once('/')
        .filter(|(prefix, model)| !prefix.is_empty() && !model.is_empty())
}

/// Whether a provider name designates an Ollama runtime.
pub fn is_ollama_provider(provider: &str) -> bool {
    provider.eq_ignore_ascii_case("ollama")
}
