//! Side-by-side comparison of one prompt across several models.
//!
//! Contenders run one after another through the chat engine under the shared
//! arena session. Each contender ends with exactly one result; a failure only
//! affects its own slot.

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::engine::{ChatEngine, ChatTurn, TurnEvent};
use crate::core::interactions::{InteractionLogError, SessionKey};
use crate::core::message::Message;
use crate::core::store::{Collection, Store, StoreError};
use crate::core::stream_errors::{classify_stream_text, ChatError};
use crate::core::usage::Estimate;

/// `stats` value of a contender that produced no usable answer.
pub const FAILED_STATS: &str = "⚠️ Failed";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contender {
    pub provider: String,
    pub model: String,
}

impl Contender {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for Contender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

#[derive(Debug, Error)]
#[error("expected provider:model, got '{0}'")]
pub struct ParseContenderError(String);

impl FromStr for Contender {
    type Err = ParseContenderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split_once(':') {
            Some((provider, model)) if !provider.trim().is_empty() && !model.trim().is_empty() => {
                Ok(Contender::new(provider.trim(), model.trim()))
            }
            _ => Err(ParseContenderError(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContenderResult {
    pub model: String,
    pub provider: String,
    pub content: String,
    pub stats: String,
    pub time: DateTime<Utc>,
    pub persona: String,
}

impl ContenderResult {
    pub fn failed(&self) -> bool {
        self.stats == FAILED_STATS
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleRound {
    pub id: Uuid,
    pub prompt: String,
    pub results: Vec<ContenderResult>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("a battle round needs a prompt")]
    EmptyPrompt,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct ArenaOrchestrator {
    engine: ChatEngine,
    store: Arc<Store>,
}

impl ArenaOrchestrator {
    pub fn new(engine: ChatEngine, store: Arc<Store>) -> Self {
        Self { engine, store }
    }

    /// Run `prompt` against every contender, in order.
    pub async fn run_battle_round(
        &self,
        prompt: &str,
        contenders: &[Contender],
        system_prompt: &str,
        persona: &str,
    ) -> Vec<ContenderResult> {
        let time = Utc::now();
        let mut results = Vec::with_capacity(contenders.len());

        for contender in contenders {
            let result = self
                .run_contender(prompt, contender, system_prompt, persona, time)
                .await;
            info!(contender = %contender, failed = result.failed(), "arena contender finished");
            results.push(result);
        }

        results
    }

    async fn run_contender(
        &self,
        prompt: &str,
        contender: &Contender,
        system_prompt: &str,
        persona: &str,
        time: DateTime<Utc>,
    ) -> ContenderResult {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.trim().is_empty() {
            messages.push(Message::system(system_prompt));
        }
        messages.push(Message::user(prompt));

        let turn = ChatTurn {
            provider: contender.provider.clone(),
            model: contender.model.clone(),
            messages,
            session: SessionKey::Arena,
            persona: persona.to_string(),
            is_new_session: false,
        };

        let (content, stats) = match self.consume(turn).await {
            Ok(reply) => {
                let estimate = self.engine.estimator().estimate(
                    &contender.model,
                    &format!("{system_prompt}\n{prompt}"),
                    &reply,
                );
                let cost = if self.engine.is_local_provider(&contender.provider) {
                    0.0
                } else {
                    estimate.cost_usd
                };
                match self.patch_latest(&contender.model, &estimate, cost) {
                    Ok(Some(id)) => debug!(%id, "arena usage patched"),
                    Ok(None) => debug!(model = %contender.model, "no arena record to patch"),
                    Err(err) => debug!(model = %contender.model, "arena usage patch skipped: {err}"),
                }
                (reply, format_stats(cost, estimate.total_tokens))
            }
            Err(error) => {
                warn!(contender = %contender, "arena contender failed: {error}");
                (placeholder(&contender.model, &error), FAILED_STATS.to_string())
            }
        };

        ContenderResult {
            model: contender.model.clone(),
            provider: contender.provider.clone(),
            content,
            stats,
            time,
            persona: persona.to_string(),
        }
    }

    /// Drain the engine stream, watching the accumulated text for error
    /// payloads that arrived as ordinary content.
    ///
    /// The stream is always drained so the engine still logs the turn.
    async fn consume(&self, turn: ChatTurn) -> Result<String, ChatError> {
        let model = turn.model.clone();
        let mut events = std::pin::pin!(self.engine.stream_turn(turn));
        let mut reply = String::new();
        let mut failure: Option<ChatError> = None;

        while let Some(event) = events.next().await {
            if failure.is_some() {
                continue;
            }
            match event {
                TurnEvent::Chunk(text) => {
                    reply.push_str(&text);
                    if classify_stream_text(&reply).is_some() {
                        failure = Some(ChatError::QuotaExceeded {
                            model: model.clone(),
                            detail: "quota exceeded (detected in stream)".to_string(),
                        });
                    }
                }
                TurnEvent::Failed { error, .. } => failure = Some(error),
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(reply),
        }
    }

    /// Attach `estimate` to the newest arena record of `model`.
    ///
    /// Returns the patched record id, or `None` when there is nothing to patch.
    pub fn patch_latest(
        &self,
        model: &str,
        estimate: &Estimate,
        cost_usd: f64,
    ) -> Result<Option<Uuid>, InteractionLogError> {
        let log = self.engine.interactions();
        let Some(record) = log.find_latest(SessionKey::Arena, Some(model))? else {
            return Ok(None);
        };
        log.update_usage(record.id, estimate.usage(), cost_usd)?;
        Ok(Some(record.id))
    }

    pub fn save_round(
        &self,
        prompt: &str,
        results: Vec<ContenderResult>,
    ) -> Result<BattleRound, ArenaError> {
        if prompt.trim().is_empty() {
            return Err(ArenaError::EmptyPrompt);
        }
        let round = BattleRound {
            id: Uuid::new_v4(),
            prompt: prompt.to_string(),
            results,
            created_at: Utc::now(),
        };
        self.store
            .insert(Collection::ArenaRounds, &round.id.to_string(), &round)?;
        info!(round = %round.id, contenders = round.results.len(), "battle round saved");
        Ok(round)
    }

    /// Saved rounds, oldest first.
    pub fn rounds(&self) -> Result<Vec<BattleRound>, StoreError> {
        self.store.all(Collection::ArenaRounds)
    }
}

pub fn format_stats(cost_usd: f64, total_tokens: u64) -> String {
    format!("💰 ${cost_usd:.5} | ⚡ {total_tokens} tok")
}

fn placeholder(model: &str, error: &ChatError) -> String {
    if error.is_quota() {
        format!("**Quota exceeded** ({model})\n\nThe free-tier limit was reached.")
    } else {
        format!("**Error**\n\n{}", error.root())
    }
}
