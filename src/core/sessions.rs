//! Named conversation threads.
//!
//! A session row only holds identity and title; its history is rebuilt from
//! the interaction log on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::interactions::{InteractionLog, SessionKey};
use crate::core::message::{last_user_content, Message, Role};
use crate::core::store::{Collection, Store, StoreError};

/// Title given to a session before its first prompt names it.
pub const NEW_SESSION_TITLE: &str = "New Chat";
const TITLE_LIMIT: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// One entry of a reconstructed conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
    pub time: DateTime<Utc>,
    pub model: String,
    pub provider: String,
    pub persona: String,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// First 30 characters of `prompt` followed by `..`, or all of it when short.
pub fn derive_title(prompt: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.chars().count() > TITLE_LIMIT {
        let head: String = trimmed.chars().take(TITLE_LIMIT).collect();
        format!("{head}..")
    } else {
        trimmed.to_string()
    }
}

#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<Store>,
    interactions: InteractionLog,
}

impl SessionRegistry {
    pub fn new(store: Arc<Store>, interactions: InteractionLog) -> Self {
        Self {
            store,
            interactions,
        }
    }

    pub fn create(&self, title: &str) -> Result<Uuid, StoreError> {
        let session = Session {
            id: Uuid::new_v4(),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        self.store
            .insert(Collection::Sessions, &session.id.to_string(), &session)?;
        info!(session = %session.id, "session created");
        Ok(session.id)
    }

    pub fn get(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        self.store.get(Collection::Sessions, &id.to_string())
    }

    /// Set a new title. Returns `false` when the title is unchanged.
    pub fn rename(&self, id: Uuid, title: &str) -> Result<bool, SessionError> {
        let mut session = self.get(id)?.ok_or(SessionError::NotFound(id))?;
        if session.title == title {
            return Ok(false);
        }
        session.title = title.to_string();
        if !self
            .store
            .update(Collection::Sessions, &id.to_string(), &session)?
        {
            return Err(SessionError::NotFound(id));
        }
        debug!(session = %id, "session renamed");
        Ok(true)
    }

    /// Name a fresh session after the last user message of its first turn.
    pub fn maybe_rename(
        &self,
        id: Uuid,
        messages: &[Message],
    ) -> Result<Option<String>, SessionError> {
        let Some(prompt) = last_user_content(messages) else {
            return Ok(None);
        };
        let title = derive_title(prompt);
        self.rename(id, &title)?;
        Ok(Some(title))
    }

    /// Every session, newest first.
    pub fn list_all(&self) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self.store.all(Collection::Sessions)?;
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// Rebuild the conversation as alternating user and assistant entries.
    pub fn messages_for(&self, session: SessionKey) -> Result<Vec<SessionMessage>, StoreError> {
        let records = self.interactions.for_session(session)?;
        let mut messages = Vec::with_capacity(records.len() * 2);

        for record in records {
            let persona = if record.persona.is_empty() {
                "Default".to_string()
            } else {
                record.persona
            };
            let prompt = record
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();

            messages.push(SessionMessage {
                role: Role::User,
                content: prompt,
                time: record.timestamp,
                model: record.model.clone(),
                provider: record.provider.clone(),
                persona: persona.clone(),
            });
            messages.push(SessionMessage {
                role: Role::Assistant,
                content: record.reply,
                time: record.timestamp,
                model: record.model,
                provider: record.provider,
                persona,
            });
        }

        Ok(messages)
    }

    /// Remove a session and its interactions. Interactions go first so a
    /// partial failure leaves the session listed and the delete can be retried.
    pub fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let removed = self.interactions.remove_session(SessionKey::Conversation(id))?;
        self.store.remove(Collection::Sessions, &id.to_string())?;
        info!(session = %id, interactions = removed, "session deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::interactions::InteractionInput;
    use chrono::TimeZone;

    fn registry() -> (SessionRegistry, InteractionLog, Arc<Store>) {
        let store = Arc::new(Store::in_memory().expect("store"));
        let log = InteractionLog::new(store.clone());
        (SessionRegistry::new(store.clone(), log.clone()), log, store)
    }

    #[test]
    fn titles_truncate_at_thirty_characters() {
        assert_eq!(derive_title("short prompt"), "short prompt");
        assert_eq!(derive_title(&"x".repeat(30)), "x".repeat(30));
        assert_eq!(
            derive_title("Explain the borrow checker to me like I am five"),
            "Explain the borrow checker to .."
        );
        assert_eq!(derive_title(&"é".repeat(31)), format!("{}..", "é".repeat(30)));
    }

    #[test]
    fn rename_is_idempotent() {
        let (sessions, _, _) = registry();
        let id = sessions.create(NEW_SESSION_TITLE).unwrap();

        assert!(sessions.rename(id, "Rust questions").unwrap());
        assert!(!sessions.rename(id, "Rust questions").unwrap());
        assert_eq!(sessions.get(id).unwrap().unwrap().title, "Rust questions");

        let missing = Uuid::new_v4();
        assert!(matches!(
            sessions.rename(missing, "x"),
            Err(SessionError::NotFound(id)) if id == missing
        ));
    }

    #[test]
    fn maybe_rename_uses_last_user_message() {
        let (sessions, _, _) = registry();
        let id = sessions.create(NEW_SESSION_TITLE).unwrap();
        let messages = vec![
            Message::system("You are a helpful assistant."),
            Message::user("What is a lifetime?"),
        ];

        let title = sessions.maybe_rename(id, &messages).unwrap();
        assert_eq!(title.as_deref(), Some("What is a lifetime?"));
        assert_eq!(sessions.maybe_rename(id, &[]).unwrap(), None);
    }

    #[test]
    fn list_all_is_newest_first() {
        let (sessions, _, store) = registry();
        for (title, day) in [("old", 1), ("newest", 3), ("middle", 2)] {
            let session = Session {
                id: Uuid::new_v4(),
                title: title.to_string(),
                created_at: Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap(),
            };
            store
                .insert(Collection::Sessions, &session.id.to_string(), &session)
                .unwrap();
        }

        let titles: Vec<String> = sessions
            .list_all()
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["newest", "middle", "old"]);
    }

    #[test]
    fn messages_are_rebuilt_from_interactions() {
        let (sessions, log, _) = registry();
        let id = sessions.create(NEW_SESSION_TITLE).unwrap();
        let key = SessionKey::Conversation(id);

        let first = vec![Message::system("sys"), Message::user("hi")];
        log.log(key, "openai", "", &first, InteractionInput::pending("gpt-4o-mini", "hello"), 0.0)
            .unwrap();
        let second = vec![
            Message::system("sys"),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("how are you?"),
        ];
        log.log(key, "openai", "Python Expert", &second, InteractionInput::pending("gpt-4o-mini", "fine"), 0.0)
            .unwrap();

        let history = sessions.messages_for(key).unwrap();
        let flat: Vec<(Role, &str, &str)> = history
            .iter()
            .map(|m| (m.role, m.content.as_str(), m.persona.as_str()))
            .collect();
        assert_eq!(
            flat,
            vec![
                (Role::User, "hi", "Default"),
                (Role::Assistant, "hello", "Default"),
                (Role::User, "how are you?", "Python Expert"),
                (Role::Assistant, "fine", "Python Expert"),
            ]
        );
        assert!(history.iter().all(|m| m.provider == "openai"));
    }

    #[test]
    fn delete_cascades_to_interactions() {
        let (sessions, log, _) = registry();
        let doomed = sessions.create("doomed").unwrap();
        let kept = sessions.create("kept").unwrap();
        for id in [doomed, doomed, kept] {
            log.log(
                SessionKey::Conversation(id),
                "openai",
                "Default",
                &[Message::user("q")],
                InteractionInput::pending("m", "a"),
                0.0,
            )
            .unwrap();
        }

        sessions.delete(doomed).unwrap();
        sessions.delete(doomed).unwrap();

        assert!(sessions.get(doomed).unwrap().is_none());
        assert!(sessions
            .messages_for(SessionKey::Conversation(doomed))
            .unwrap()
            .is_empty());
        assert_eq!(
            sessions
                .messages_for(SessionKey::Conversation(kept))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(sessions.list_all().unwrap().len(), 1);
    }
}
