//! One-shot chat from the command line
//!
//! Picks a provider and model, replays the stored history of the session
//! when one is given, and streams the reply to stdout as it arrives.

use futures_util::{Stream, StreamExt};
use std::error::Error;
use std::io::Write;
use std::pin::pin;
use uuid::Uuid;

use crate::core::app::Calango;
use crate::core::config::Config;
use crate::core::conversation::SendRequest;
use crate::core::message::Message;
use crate::core::persona::DEFAULT_PERSONA;

pub struct ChatOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub session: Option<Uuid>,
    pub persona: Option<String>,
    pub prompt: String,
}

pub fn default_persona(config: &Config) -> String {
    config
        .default_persona
        .clone()
        .unwrap_or_else(|| DEFAULT_PERSONA.to_string())
}

/// Resolve the provider and model for a turn.
///
/// Explicit arguments win, then the config defaults, then the first
/// configured provider and its first allowed model.
pub fn pick_target(
    app: &Calango,
    config: &Config,
    provider: Option<String>,
    model: Option<String>,
) -> Result<(String, String), Box<dyn Error>> {
    let provider = match provider.or_else(|| config.default_provider.clone()) {
        Some(provider) => provider,
        None => app
            .engine
            .get_configured_providers()?
            .into_iter()
            .next()
            .ok_or("No providers configured. Run 'calango providers set' or 'calango providers import' first.")?,
    };

    if let Some(model) = model {
        return Ok((provider, model));
    }
    if let Some(model) = config.default_model_for(&provider) {
        return Ok((provider, model.to_string()));
    }
    let model = app
        .engine
        .get_models_for_provider(&provider)?
        .into_iter()
        .next()
        .ok_or_else(|| format!("No model given and provider '{provider}' has no allowed models"))?;
    Ok((provider, model))
}

pub async fn run_chat(
    app: &Calango,
    config: &Config,
    options: ChatOptions,
) -> Result<(), Box<dyn Error>> {
    let (session, stream) = start_chat(app, config, options)?;
    let mut stdout = std::io::stdout().lock();
    write_reply(stream, &mut stdout).await?;
    eprintln!("session: {session}");
    Ok(())
}

pub(crate) fn start_chat(
    app: &Calango,
    config: &Config,
    options: ChatOptions,
) -> Result<(Uuid, impl Stream<Item = String> + Send + 'static), Box<dyn Error>> {
    let (provider, model) = pick_target(app, config, options.provider, options.model)?;

    let history = match options.session {
        Some(id) => {
            if app.sessions.get(id)?.is_none() {
                return Err(format!("Session {id} not found").into());
            }
            app.chat
                .history(id)?
                .into_iter()
                .map(|entry| Message::new(entry.role, entry.content))
                .collect()
        }
        None => Vec::new(),
    };

    let request = SendRequest {
        prompt: options.prompt,
        session: options.session,
        provider,
        model,
        persona: options.persona.unwrap_or_else(|| default_persona(config)),
        history,
    };
    Ok(app.chat.send_message(request)?)
}

pub(crate) async fn write_reply<W: Write>(
    stream: impl Stream<Item = String>,
    out: &mut W,
) -> std::io::Result<()> {
    let mut stream = pin!(stream);
    while let Some(chunk) = stream.next().await {
        out.write_all(chunk.as_bytes())?;
        out.flush()?;
    }
    writeln!(out)
}
