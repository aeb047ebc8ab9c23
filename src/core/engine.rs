//! One streaming chat turn against one provider and model.
//!
//! A turn moves through credential resolution, streaming and finalization and
//! always ends logged: failures become reply text rather than errors, so the
//! caller can treat whatever the stream yields as the conversation.

use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::ChatMessage;
use crate::core::chat_stream::{CompletionRequest, CompletionTransport};
use crate::core::interactions::{
    InteractionInput, InteractionLog, InteractionRecord, SessionKey,
};
use crate::core::message::Message;
use crate::core::providers::{resolve_credentials, CredentialSource, ProviderRegistry};
use crate::core::routes::{routed_model, RouteTable};
use crate::core::sessions::SessionRegistry;
use crate::core::store::StoreError;
use crate::core::stream_errors::{classify_stream_text, ChatError};
use crate::core::usage::{prompt_text, UsageEstimator};

/// Everything needed to run one turn.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub provider: String,
    pub model: String,
    pub messages: Vec<Message>,
    pub session: SessionKey,
    pub persona: String,
    pub is_new_session: bool,
}

/// Item produced by [`ChatEngine::stream_turn`].
#[derive(Debug)]
pub enum TurnEvent {
    Chunk(String),
    /// The turn failed; `text` is what stands in for (or completes) the reply.
    Failed { error: ChatError, text: String },
}

impl TurnEvent {
    pub fn text(&self) -> &str {
        match self {
            TurnEvent::Chunk(text) | TurnEvent::Failed { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            TurnEvent::Chunk(text) | TurnEvent::Failed { text, .. } => text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    ResolvingCredentials,
    Streaming,
    Finalizing,
    Logged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
}

#[derive(Clone)]
pub struct ChatEngine {
    registry: ProviderRegistry,
    interactions: InteractionLog,
    sessions: SessionRegistry,
    estimator: Arc<UsageEstimator>,
    routes: Arc<RouteTable>,
    transport: Arc<dyn CompletionTransport>,
    credentials: Arc<dyn CredentialSource>,
}

impl ChatEngine {
    pub fn new(
        registry: ProviderRegistry,
        interactions: InteractionLog,
        sessions: SessionRegistry,
        estimator: Arc<UsageEstimator>,
        routes: Arc<RouteTable>,
        transport: Arc<dyn CompletionTransport>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            registry,
            interactions,
            sessions,
            estimator,
            routes,
            transport,
            credentials,
        }
    }

    pub fn interactions(&self) -> &InteractionLog {
        &self.interactions
    }

    pub fn estimator(&self) -> &UsageEstimator {
        &self.estimator
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Turns against local inference routes are estimated but cost nothing.
    pub fn is_local_provider(&self, provider: &str) -> bool {
        self.routes.is_local(provider)
    }

    pub fn get_configured_providers(&self) -> Result<Vec<String>, StoreError> {
        self.registry.list_configured()
    }

    pub fn get_models_for_provider(&self, name: &str) -> Result<Vec<String>, StoreError> {
        self.registry.models_for(name)
    }

    /// Run a turn and yield its reply text chunk by chunk.
    ///
    /// The concatenated chunks equal the reply recorded in the interaction log.
    pub fn run_chat(&self, turn: ChatTurn) -> impl Stream<Item = String> + Send + 'static {
        self.stream_turn(turn).map(TurnEvent::into_text)
    }

    /// Run a turn, keeping failures distinguishable from content.
    ///
    /// The stream is lazy: nothing happens until it is polled, and the turn is
    /// logged before the stream reports its end.
    pub fn stream_turn(&self, turn: ChatTurn) -> impl Stream<Item = TurnEvent> + Send + 'static {
        let engine = self.clone();

        async_stream::stream! {
            enter(TurnState::ResolvingCredentials, &turn);
            let credentials = match resolve_credentials(
                engine.credentials.as_ref(),
                &engine.registry,
                &turn.provider,
            ) {
                Ok(credentials) => credentials,
                Err(error) => {
                    let text = error.user_message();
                    warn!(provider = %turn.provider, "no credentials for turn");
                    engine.finalize(&turn, &text, Outcome::Failed);
                    yield TurnEvent::Failed { error, text };
                    return;
                }
            };

            enter(TurnState::Streaming, &turn);
            let request = CompletionRequest {
                model: routed_model(&credentials.prefix, &turn.model),
                messages: turn.messages.iter().map(ChatMessage::from).collect(),
                api_key: credentials.api_key,
            };

            let mut reply = String::new();
            let mut deltas = match engine.transport.stream(request).await {
                Ok(deltas) => deltas,
                Err(err) => {
                    let error = ChatError::from_transport(&turn.provider, &turn.model, &err);
                    let text = error.user_message();
                    warn!(provider = %turn.provider, model = %turn.model, "completion failed: {err}");
                    engine.finalize(&turn, &text, Outcome::Failed);
                    yield TurnEvent::Failed { error, text };
                    return;
                }
            };

            while let Some(delta) = deltas.next().await {
                match delta {
                    Ok(text) => {
                        if text.is_empty() {
                            continue;
                        }
                        reply.push_str(&text);
                        yield TurnEvent::Chunk(text);
                    }
                    Err(err) => {
                        let cause = ChatError::from_transport(&turn.provider, &turn.model, &err);
                        let error = if reply.is_empty() {
                            cause
                        } else {
                            ChatError::StreamInterrupted { cause: Box::new(cause) }
                        };
                        let text = error.user_message();
                        reply.push_str(&text);
                        warn!(provider = %turn.provider, model = %turn.model, "stream failed: {err}");
                        engine.finalize(&turn, &reply, Outcome::Failed);
                        yield TurnEvent::Failed { error, text };
                        return;
                    }
                }
            }

            engine.finalize(&turn, &reply, Outcome::Completed);
        }
    }

    /// Log the turn, then patch in estimated usage when the reply is real
    /// model output, then name a fresh session.
    fn finalize(&self, turn: &ChatTurn, reply: &str, outcome: Outcome) {
        enter(TurnState::Finalizing, turn);

        let input = InteractionInput::pending(&turn.model, reply);
        let record = match self.interactions.log(
            turn.session,
            &turn.provider,
            &turn.persona,
            &turn.messages,
            input,
            0.0,
        ) {
            Ok(record) => record,
            Err(err) => {
                warn!(session = %turn.session, "failed to log interaction: {err}");
                return;
            }
        };

        let in_band_error = classify_stream_text(reply);
        if outcome == Outcome::Completed && in_band_error.is_none() {
            self.patch_usage(turn, &record, reply);
        } else {
            debug!(id = %record.id, ?outcome, ?in_band_error, "usage left at zero");
        }

        if turn.is_new_session && !turn.messages.is_empty() {
            if let SessionKey::Conversation(id) = turn.session {
                if let Err(err) = self.sessions.maybe_rename(id, &turn.messages) {
                    warn!(session = %id, "failed to title session: {err}");
                }
            }
        }

        enter(TurnState::Logged, turn);
    }

    fn patch_usage(&self, turn: &ChatTurn, record: &InteractionRecord, reply: &str) {
        let estimate = self
            .estimator
            .estimate(&turn.model, &prompt_text(&turn.messages), reply);
        let cost = if self.is_local_provider(&turn.provider) {
            0.0
        } else {
            estimate.cost_usd
        };

        if let Err(err) = self.interactions.update_usage(record.id, estimate.usage(), cost) {
            debug!(id = %record.id, "usage patch skipped: {err}");
        }
    }
}

fn enter(state: TurnState, turn: &ChatTurn) {
    if state == TurnState::Logged {
        info!(provider = %turn.provider, model = %turn.model, session = %turn.session, "turn logged");
    } else {
        debug!(?state, provider = %turn.provider, model = %turn.model, "chat turn");
    }
}
