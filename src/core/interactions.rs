//! Append-only record of chat turns.
//!
//! A turn is written once with placeholder usage and may be patched once more
//! by `update_usage` after its stream has been drained. Between those two
//! writes the record is visible with zero usage.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::core::message::Message;
use crate::core::store::{Collection, Store, StoreError};
use crate::core::usage::Usage;

/// Session identifier shared by every arena contender.
pub const ARENA_SESSION: &str = "arena";

/// What an interaction belongs to: a conversation, or the arena group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SessionKey {
    Conversation(Uuid),
    Arena,
}

#[derive(Debug, Error)]
#[error("invalid session id '{0}'")]
pub struct InvalidSessionKey(pub String);

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKey::Conversation(id) => write!(f, "{id}"),
            SessionKey::Arena => f.write_str(ARENA_SESSION),
        }
    }
}

impl std::str::FromStr for SessionKey {
    type Err = InvalidSessionKey;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == ARENA_SESSION {
            return Ok(SessionKey::Arena);
        }
        Uuid::parse_str(value)
            .map(SessionKey::Conversation)
            .map_err(|_| InvalidSessionKey(value.to_string()))
    }
}

impl TryFrom<String> for SessionKey {
    type Error = InvalidSessionKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SessionKey> for String {
    fn from(key: SessionKey) -> Self {
        key.to_string()
    }
}

impl From<Uuid> for SessionKey {
    fn from(id: Uuid) -> Self {
        SessionKey::Conversation(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: Uuid,
    pub session_id: SessionKey,
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub persona: String,
    pub messages: Vec<Message>,
    pub reply: String,
    pub usage: Usage,
    pub cost_usd: f64,
}

/// Outcome of a turn as handed to the log.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionInput {
    pub usage: Usage,
    pub reply_text: String,
    pub model: String,
}

impl InteractionInput {
    /// A reply whose usage is not known yet.
    pub fn pending(model: impl Into<String>, reply_text: impl Into<String>) -> Self {
        Self {
            usage: Usage::default(),
            reply_text: reply_text.into(),
            model: model.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum InteractionLogError {
    #[error("interaction {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSummary {
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    pub interactions: usize,
    pub favorite_model: Option<String>,
    pub cost_by_model: BTreeMap<String, f64>,
    pub tokens_by_day: BTreeMap<NaiveDate, u64>,
}

#[derive(Clone)]
pub struct InteractionLog {
    store: Arc<Store>,
}

impl InteractionLog {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn log(
        &self,
        session: SessionKey,
        provider: &str,
        persona: &str,
        messages: &[Message],
        input: InteractionInput,
        cost_usd: f64,
    ) -> Result<InteractionRecord, StoreError> {
        let record = InteractionRecord {
            id: Uuid::new_v4(),
            session_id: session,
            timestamp: Utc::now(),
            provider: provider.to_string(),
            model: input.model,
            persona: persona.to_string(),
            messages: messages.to_vec(),
            reply: input.reply_text,
            usage: input.usage,
            cost_usd,
        };
        self.store
            .insert(Collection::Interactions, &record.id.to_string(), &record)?;
        debug!(
            id = %record.id,
            session = %record.session_id,
            provider,
            model = %record.model,
            "interaction logged"
        );
        Ok(record)
    }

    /// Records of one session, oldest first.
    pub fn for_session(&self, session: SessionKey) -> Result<Vec<InteractionRecord>, StoreError> {
        let mut records: Vec<InteractionRecord> =
            self.store
                .find(Collection::Interactions, "session_id", &session.to_string())?;
        records.sort_by_key(|record| record.timestamp);
        Ok(records)
    }

    /// Most recent record of `session`, optionally restricted to `model`.
    pub fn find_latest(
        &self,
        session: SessionKey,
        model: Option<&str>,
    ) -> Result<Option<InteractionRecord>, StoreError> {
        Ok(self
            .for_session(session)?
            .into_iter()
            .rev()
            .find(|record| model.is_none_or(|model| record.model == model)))
    }

    /// Attach usage and cost to an existing record.
    pub fn update_usage(
        &self,
        id: Uuid,
        usage: Usage,
        cost_usd: f64,
    ) -> Result<InteractionRecord, InteractionLogError> {
        let key = id.to_string();
        let mut record: InteractionRecord = self
            .store
            .get(Collection::Interactions, &key)?
            .ok_or(InteractionLogError::NotFound(id))?;
        record.usage = usage;
        record.cost_usd = cost_usd;
        if !self.store.update(Collection::Interactions, &key, &record)? {
            return Err(InteractionLogError::NotFound(id));
        }
        debug!(%id, tokens = usage.total(), cost_usd, "interaction usage patched");
        Ok(record)
    }

    /// Delete every record of `session`. Safe to repeat.
    pub fn remove_session(&self, session: SessionKey) -> Result<usize, StoreError> {
        self.store
            .remove_where(Collection::Interactions, "session_id", &session.to_string())
    }

    pub fn all(&self) -> Result<Vec<InteractionRecord>, StoreError> {
        self.store.all(Collection::Interactions)
    }

    pub fn usage_summary(&self) -> Result<UsageSummary, StoreError> {
        let records = self.all()?;
        let mut summary = UsageSummary {
            interactions: records.len(),
            ..UsageSummary::default()
        };
        let mut model_counts: BTreeMap<&str, usize> = BTreeMap::new();

        for record in &records {
            let tokens = record.usage.total();
            summary.total_cost_usd += record.cost_usd;
            summary.total_tokens += tokens;
            *summary
                .cost_by_model
                .entry(record.model.clone())
                .or_default() += record.cost_usd;
            *summary
                .tokens_by_day
                .entry(record.timestamp.date_naive())
                .or_default() += tokens;
            *model_counts.entry(record.model.as_str()).or_default() += 1;
        }

        let mut best: Option<(&str, usize)> = None;
        for (model, count) in model_counts {
            if best.is_none_or(|(_, top)| count > top) {
                best = Some((model, count));
            }
        }
        summary.favorite_model = best.map(|(model, _)| model.to_string());

        Ok(summary)
    }
}
