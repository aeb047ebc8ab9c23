use futures_util::Stream;
use tracing::debug;
use uuid::Uuid;

use crate::core::engine::{ChatEngine, ChatTurn};
use crate::core::interactions::SessionKey;
use crate::core::message::Message;
use crate::core::persona::PersonaBook;
use crate::core::sessions::{SessionMessage, SessionRegistry, NEW_SESSION_TITLE};
use crate::core::store::StoreError;

/// A user prompt sent within a conversation.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub prompt: String,
    /// Existing session, or `None` to start a new one.
    pub session: Option<Uuid>,
    pub provider: String,
    pub model: String,
    pub persona: String,
    /// Earlier messages of the conversation. System messages are dropped and
    /// replaced by the persona prompt.
    pub history: Vec<Message>,
}

/// Session-aware wrapper around [`ChatEngine::run_chat`].
#[derive(Clone)]
pub struct ChatService {
    engine: ChatEngine,
    sessions: SessionRegistry,
    personas: PersonaBook,
}

impl ChatService {
    pub fn new(engine: ChatEngine, sessions: SessionRegistry, personas: PersonaBook) -> Self {
        Self {
            engine,
            sessions,
            personas,
        }
    }

    /// Start a turn. Returns the session it belongs to and the reply stream.
    pub fn send_message(
        &self,
        request: SendRequest,
    ) -> Result<(Uuid, impl Stream<Item = String> + Send + 'static), StoreError> {
        let (session, is_new_session) = match request.session {
            Some(id) => (id, false),
            None => (self.sessions.create(NEW_SESSION_TITLE)?, true),
        };

        let system_prompt = self.personas.prompt_for(&request.persona)?;
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(Message::system(system_prompt));
        messages.extend(
            request
                .history
                .into_iter()
                .filter(|message| !message.role.is_system()),
        );
        messages.push(Message::user(request.prompt));

        debug!(%session, is_new_session, messages = messages.len(), "sending message");
        let stream = self.engine.run_chat(ChatTurn {
            provider: request.provider,
            model: request.model,
            messages,
            session: SessionKey::Conversation(session),
            persona: request.persona,
            is_new_session,
        });
        Ok((session, stream))
    }

    pub fn history(&self, session: Uuid) -> Result<Vec<SessionMessage>, StoreError> {
        self.sessions
            .messages_for(SessionKey::Conversation(session))
    }
}
