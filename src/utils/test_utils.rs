use async_trait::async_trait;
use futures_util::stream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::core::app::Calango;
use crate::core::chat_stream::{
    CompletionRequest, CompletionTransport, DeltaStream, TransportError,
};
use crate::core::providers::CredentialSource;
use crate::core::routes::RouteTable;
use crate::core::store::Store;
use crate::core::usage::UsageEstimator;

/// Canned behaviour for one routed model.
#[derive(Debug, Clone)]
pub enum Script {
    Chunks(Vec<String>),
    FailAfter {
        chunks: Vec<String>,
        error: TransportError,
    },
    SetupError(TransportError),
}

/// Completion transport that replays scripts keyed by routed model and
/// records every request it receives.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

fn owned(chunks: &[&str]) -> Vec<String> {
    chunks.iter().map(|c| c.to_string()).collect()
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, routed_model: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(routed_model.to_string(), script);
        self
    }

    pub fn with_chunks(self, routed_model: &str, chunks: &[&str]) -> Self {
        self.with_script(routed_model, Script::Chunks(owned(chunks)))
    }

    pub fn with_failure_after(
        self,
        routed_model: &str,
        chunks: &[&str],
        error: TransportError,
    ) -> Self {
        self.with_script(
            routed_model,
            Script::FailAfter {
                chunks: owned(chunks),
                error,
            },
        )
    }

    pub fn with_setup_error(self, routed_model: &str, error: TransportError) -> Self {
        self.with_script(routed_model, Script::SetupError(error))
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn stream(&self, request: CompletionRequest) -> Result<DeltaStream, TransportError> {
        let script = self.scripts.lock().unwrap().get(&request.model).cloned();
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);

        let items: Vec<Result<String, TransportError>> = match script {
            None => return Err(TransportError::UnknownRoute(model)),
            Some(Script::SetupError(error)) => return Err(error),
            Some(Script::Chunks(chunks)) => chunks.into_iter().map(Ok).collect(),
            Some(Script::FailAfter { chunks, error }) => chunks
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(error)))
                .collect(),
        };
        Ok(stream::iter(items).boxed())
    }
}

/// Fixed credential overrides standing in for the environment.
#[derive(Default)]
pub struct StaticCredentials {
    values: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new<'a>(values: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl CredentialSource for StaticCredentials {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// In-memory application wired to a scripted transport.
pub fn scripted_app(transport: Arc<ScriptedTransport>, credentials: StaticCredentials) -> Calango {
    scripted_app_with_routes(transport, credentials, RouteTable::builtin())
}

pub fn scripted_app_with_routes(
    transport: Arc<ScriptedTransport>,
    credentials: StaticCredentials,
    routes: RouteTable,
) -> Calango {
    let store = Arc::new(Store::in_memory().expect("in-memory store"));
    Calango::from_parts(
        store,
        UsageEstimator::approximate(),
        routes,
        transport,
        Arc::new(credentials),
    )
    .expect("wire test app")
}
