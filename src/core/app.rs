use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::arena::ArenaOrchestrator;
use crate::core::chat_stream::{CompletionTransport, HttpTransport};
use crate::core::config::data::path_display;
use crate::core::config::{Config, ConfigError};
use crate::core::conversation::ChatService;
use crate::core::engine::ChatEngine;
use crate::core::interactions::InteractionLog;
use crate::core::persona::PersonaBook;
use crate::core::providers::{CredentialSource, EnvCredentials, ProviderRegistry};
use crate::core::routes::RouteTable;
use crate::core::sessions::SessionRegistry;
use crate::core::store::{Store, StoreError};
use crate::core::usage::UsageEstimator;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Every component, wired over one shared document store.
#[derive(Clone)]
pub struct Calango {
    pub store: Arc<Store>,
    pub registry: ProviderRegistry,
    pub interactions: InteractionLog,
    pub sessions: SessionRegistry,
    pub personas: PersonaBook,
    pub engine: ChatEngine,
    pub chat: ChatService,
    pub arena: ArenaOrchestrator,
}

impl Calango {
    /// Open the on-disk store named by `config` and talk to real providers.
    pub fn open(config: &Config) -> Result<Self, AppError> {
        let database = config.database_path()?;
        let store = Arc::new(Store::open(&database)?);
        info!(database = %path_display(&database), "store opened");

        let routes = RouteTable::with_custom(&config.custom_routes);
        Ok(Self::from_parts(
            store,
            load_estimator(config),
            routes.clone(),
            Arc::new(HttpTransport::new(routes)),
            Arc::new(EnvCredentials),
        )?)
    }

    pub fn from_parts(
        store: Arc<Store>,
        estimator: UsageEstimator,
        routes: RouteTable,
        transport: Arc<dyn CompletionTransport>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, StoreError> {
        let registry = ProviderRegistry::new(store.clone());
        let interactions = InteractionLog::new(store.clone());
        let sessions = SessionRegistry::new(store.clone(), interactions.clone());
        let personas = PersonaBook::open(store.clone())?;
        let engine = ChatEngine::new(
            registry.clone(),
            interactions.clone(),
            sessions.clone(),
            Arc::new(estimator),
            Arc::new(routes),
            transport,
            credentials,
        );
        let chat = ChatService::new(engine.clone(), sessions.clone(), personas.clone());
        let arena = ArenaOrchestrator::new(engine.clone(), store.clone());

        Ok(Self {
            store,
            registry,
            interactions,
            sessions,
            personas,
            engine,
            chat,
            arena,
        })
    }
}

#[cfg(feature = "hf-tokenizers")]
fn load_estimator(config: &Config) -> UsageEstimator {
    use crate::core::usage::TokenizerSet;

    let Some(dir) = &config.tokenizer_dir else {
        return UsageEstimator::approximate();
    };
    match TokenizerSet::load_dir(dir) {
        Ok(set) if !set.is_empty() => UsageEstimator::new(set),
        Ok(_) => {
            debug!(dir = %path_display(dir), "no tokenizers found");
            UsageEstimator::approximate()
        }
        Err(err) => {
            tracing::warn!(dir = %path_display(dir), "cannot read tokenizers: {err}");
            UsageEstimator::approximate()
        }
    }
}

#[cfg(not(feature = "hf-tokenizers"))]
fn load_estimator(config: &Config) -> UsageEstimator {
    if let Some(dir) = &config.tokenizer_dir {
        debug!(
            dir = %path_display(dir),
            "tokenizer_dir ignored without the hf-tokenizers feature"
        );
    }
    UsageEstimator::approximate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_store_under_data_dir() {
        let temp_dir = TempDir::new().expect("temp dir");
        let config = Config {
            data_dir: Some(temp_dir.path().join("data")),
            ..Default::default()
        };

        let app = Calango::open(&config).expect("open app");
        assert!(temp_dir.path().join("data").join("calango.db").exists());
        assert_eq!(app.personas.list().unwrap().len(), 3);
        assert!(app.engine.get_configured_providers().unwrap().is_empty());

        app.registry
            .upsert("openai", "sk", vec!["gpt-4o-mini".to_string()])
            .unwrap();
        drop(app);

        let reopened = Calango::open(&config).expect("reopen app");
        assert_eq!(
            reopened.engine.get_models_for_provider("openai").unwrap(),
            vec!["gpt-4o-mini"]
        );
        assert!(reopened
            .engine
            .get_models_for_provider("anthropic")
            .unwrap()
            .is_empty());
    }
}
