//! Command-line interface parsing and handling
//!
//! This module parses command-line arguments, opens the application and
//! dispatches to the subcommand handlers. Output is plain text.

pub mod arena;
pub mod chat;
pub mod model_list;
pub mod provider_list;
pub mod sessions;
pub mod usage;

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::core::app::Calango;
use crate::core::arena::Contender;
use crate::core::config::Config;
use crate::utils::logging::init_tracing;

#[derive(Parser)]
#[command(name = "calango")]
#[command(about = "A multi-provider LLM chat client")]
#[command(
    long_about = "Calango routes prompts to configurable LLM providers, streams the reply, \
and records every interaction with its estimated token usage and cost.\n\n\
Credentials:\n\
  {PROVIDER}_API_KEY   Overrides the stored key for a provider (GEMINI_API_KEY for google/gemini)\n\
  RUST_LOG             Diagnostic log filter (written to stderr)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Use this config file instead of the platform default
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage configured providers
    Providers {
        #[command(subcommand)]
        command: ProvidersCommand,
    },
    /// List the models allowed for a provider
    Models {
        /// Provider name (defaults to the configured default provider)
        provider: Option<String>,
    },
    /// Send a prompt and stream the reply
    Chat {
        #[arg(short = 'p', long)]
        provider: Option<String>,
        #[arg(short = 'm', long)]
        model: Option<String>,
        /// Continue an existing session
        #[arg(short = 's', long)]
        session: Option<Uuid>,
        #[arg(long)]
        persona: Option<String>,
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Run one prompt against several models
    Arena {
        /// Contender as provider:model (repeatable)
        #[arg(short = 'c', long = "contender", required = true)]
        contenders: Vec<Contender>,
        #[arg(long)]
        persona: Option<String>,
        /// Keep the round in the arena history
        #[arg(long)]
        save: bool,
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// List saved arena rounds
    Rounds,
    /// Inspect and manage conversation sessions
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
    /// List personas
    Personas,
    /// Show token usage and estimated cost
    Usage,
    /// Set configuration values
    Set {
        /// default-provider, default-model or default-persona
        key: String,
        #[arg(required = true, trailing_var_arg = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        key: String,
        /// Provider, when unsetting default-model
        value: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ProvidersCommand {
    /// List configured providers and their models
    List,
    /// Replace all providers with the contents of a TOML file
    Import { file: PathBuf },
    /// Add or update one provider
    Set {
        name: String,
        /// API key; may be omitted when the environment provides one
        #[arg(long)]
        key: Option<String>,
        /// Comma-separated list of allowed models
        #[arg(long, value_delimiter = ',', required = true)]
        models: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum SessionsCommand {
    List,
    Show { id: Uuid },
    Rename {
        id: Uuid,
        #[arg(required = true, trailing_var_arg = true)]
        title: Vec<String>,
    },
    Delete { id: Uuid },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::get_config_path()?,
    };
    let config = Config::load_from_path(&config_path)?;
    init_tracing(config.log_filter.as_deref());

    tokio::runtime::Runtime::new()?.block_on(async_main(args.command, config, &config_path))
}

async fn async_main(
    command: Commands,
    mut config: Config,
    config_path: &Path,
) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Set { key, value } => {
            set_config_value(&mut config, &key, &value.join(" "))?;
            config.save_to_path(config_path)?;
            Ok(())
        }
        Commands::Unset { key, value } => {
            unset_config_value(&mut config, &key, value.as_deref())?;
            config.save_to_path(config_path)?;
            Ok(())
        }
        Commands::Providers { command } => {
            let app = Calango::open(&config)?;
            match command {
                ProvidersCommand::List => provider_list::list_providers(&app, &config),
                ProvidersCommand::Import { file } => provider_list::import(&app, &file),
                ProvidersCommand::Set { name, key, models } => {
                    provider_list::set_provider(&app, &name, key.as_deref(), models)
                }
            }
        }
        Commands::Models { provider } => {
            model_list::list_models(&Calango::open(&config)?, &config, provider)
        }
        Commands::Chat {
            provider,
            model,
            session,
            persona,
            prompt,
        } => {
            let options = chat::ChatOptions {
                provider,
                model,
                session,
                persona,
                prompt: prompt.join(" "),
            };
            chat::run_chat(&Calango::open(&config)?, &config, options).await
        }
        Commands::Arena {
            contenders,
            persona,
            save,
            prompt,
        } => {
            let persona = persona.unwrap_or_else(|| chat::default_persona(&config));
            arena::run_arena(&Calango::open(&config)?, &prompt.join(" "), &contenders, &persona, save)
                .await
        }
        Commands::Rounds => arena::list_rounds(&Calango::open(&config)?),
        Commands::Sessions { command } => {
            let app = Calango::open(&config)?;
            match command {
                SessionsCommand::List => sessions::list_sessions(&app),
                SessionsCommand::Show { id } => sessions::show_session(&app, id),
                SessionsCommand::Rename { id, title } => {
                    sessions::rename_session(&app, id, &title.join(" "))
                }
                SessionsCommand::Delete { id } => sessions::delete_session(&app, id),
            }
        }
        Commands::Personas => {
            for persona in Calango::open(&config)?.personas.list()? {
                println!("{}: {}", persona.name, persona.prompt);
            }
            Ok(())
        }
        Commands::Usage => usage::print_usage(&Calango::open(&config)?),
    }
}

fn set_config_value(config: &mut Config, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
    match key {
        "default-provider" => {
            config.default_provider = Some(value.to_string());
            println!("✅ Set default-provider to: {value}");
        }
        "default-model" => {
            let Some((provider, model)) = value.split_once(' ') else {
                return Err(
                    "To set a default model, specify the provider and model \
                     (example: calango set default-model openai gpt-4o-mini)"
                        .into(),
                );
            };
            config.set_default_model(provider, model.trim());
            println!("✅ Set default-model for provider '{provider}' to: {}", model.trim());
        }
        "default-persona" => {
            config.default_persona = Some(value.to_string());
            println!("✅ Set default-persona to: {value}");
        }
        _ => return Err(format!("Unknown config key: {key}").into()),
    }
    Ok(())
}

fn unset_config_value(
    config: &mut Config,
    key: &str,
    value: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    match (key, value) {
        ("default-provider", _) => config.default_provider = None,
        ("default-persona", _) => config.default_persona = None,
        ("default-model", Some(provider)) => config
            .default_models
            .retain(|name, _| !name.eq_ignore_ascii_case(provider)),
        ("default-model", None) => {
            return Err("To unset a default model, specify the provider".into())
        }
        _ => return Err(format!("Unknown config key: {key}").into()),
    }
    println!("✅ Unset {key}");
    Ok(())
}

#[cfg(test)]
mod tests;
