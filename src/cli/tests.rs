use super::*;
use crate::core::arena::{format_stats, ContenderResult, FAILED_STATS};
use crate::core::interactions::UsageSummary;
use crate::utils::test_utils::{scripted_app, ScriptedTransport, StaticCredentials};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

fn parse_args(argv: &[&str]) -> Args {
    Args::try_parse_from(argv)
        .unwrap_or_else(|err| panic!("argv={argv:?} should parse successfully: {err}"))
}

#[test]
fn chat_joins_trailing_prompt_words() {
    let args = parse_args(&[
        "calango", "chat", "-p", "openai", "-m", "gpt-4o", "what", "is", "rust",
    ]);
    match args.command {
        Commands::Chat {
            provider,
            model,
            session,
            persona,
            prompt,
        } => {
            assert_eq!(provider.as_deref(), Some("openai"));
            assert_eq!(model.as_deref(), Some("gpt-4o"));
            assert!(session.is_none());
            assert!(persona.is_none());
            assert_eq!(prompt.join(" "), "what is rust");
        }
        _ => panic!("expected chat subcommand"),
    }
}

#[test]
fn chat_requires_a_prompt() {
    assert!(Args::try_parse_from(["calango", "chat"]).is_err());
}

#[test]
fn chat_rejects_malformed_session_id() {
    assert!(Args::try_parse_from(["calango", "chat", "-s", "not-a-uuid", "hi"]).is_err());
}

#[test]
fn global_config_flag_is_accepted_after_subcommand() {
    let args = parse_args(&["calango", "usage", "--config", "/tmp/calango.toml"]);
    assert_eq!(args.config, Some(PathBuf::from("/tmp/calango.toml")));
    assert!(matches!(args.command, Commands::Usage));
}

#[test]
fn arena_parses_repeated_contenders() {
    let args = parse_args(&[
        "calango",
        "arena",
        "-c",
        "openai:gpt-4o-mini",
        "--contender",
        "ollama:llama3",
        "--save",
        "compare",
        "these",
    ]);
    match args.command {
        Commands::Arena {
            contenders,
            save,
            prompt,
            ..
        } => {
            assert_eq!(
                contenders,
                vec![
                    Contender::new("openai", "gpt-4o-mini"),
                    Contender::new("ollama", "llama3")
                ]
            );
            assert!(save);
            assert_eq!(prompt.join(" "), "compare these");
        }
        _ => panic!("expected arena subcommand"),
    }
}

#[test]
fn arena_rejects_contender_without_model() {
    assert!(Args::try_parse_from(["calango", "arena", "-c", "openai", "hi"]).is_err());
}

#[test]
fn providers_set_splits_models_on_commas() {
    let args = parse_args(&[
        "calango",
        "providers",
        "set",
        "groq",
        "--models",
        "llama-3.1-8b,mixtral",
    ]);
    match args.command {
        Commands::Providers {
            command: ProvidersCommand::Set { name, key, models },
        } => {
            assert_eq!(name, "groq");
            assert!(key.is_none());
            assert_eq!(models, vec!["llama-3.1-8b", "mixtral"]);
        }
        _ => panic!("expected providers set subcommand"),
    }
}

#[test]
fn set_and_unset_default_model() {
    let mut config = Config::default();
    set_config_value(&mut config, "default-model", "OpenAI gpt-4o").unwrap();
    assert_eq!(config.default_model_for("openai"), Some("gpt-4o"));

    assert!(set_config_value(&mut config, "default-model", "openai").is_err());
    assert!(unset_config_value(&mut config, "default-model", None).is_err());

    unset_config_value(&mut config, "default-model", Some("OPENAI")).unwrap();
    assert!(config.default_models.is_empty());
}

#[test]
fn set_rejects_unknown_keys() {
    let mut config = Config::default();
    assert!(set_config_value(&mut config, "theme", "dark").is_err());
    assert!(unset_config_value(&mut config, "theme", None).is_err());

    set_config_value(&mut config, "default-persona", "Python Expert").unwrap();
    assert_eq!(config.default_persona.as_deref(), Some("Python Expert"));
    unset_config_value(&mut config, "default-persona", None).unwrap();
    assert!(config.default_persona.is_none());
}

#[test]
fn pick_target_prefers_arguments_then_config_then_registry() {
    let app = scripted_app(Arc::new(ScriptedTransport::new()), StaticCredentials::empty());
    let mut config = Config::default();

    assert!(chat::pick_target(&app, &config, None, None).is_err());

    app.registry
        .upsert("mistral", "k", vec!["mistral-small".to_string()])
        .unwrap();
    assert_eq!(
        chat::pick_target(&app, &config, None, None).unwrap(),
        ("mistral".to_string(), "mistral-small".to_string())
    );

    config.default_provider = Some("openai".to_string());
    config.set_default_model("openai", "gpt-4o");
    assert_eq!(
        chat::pick_target(&app, &config, None, None).unwrap(),
        ("openai".to_string(), "gpt-4o".to_string())
    );
    assert_eq!(
        chat::pick_target(&app, &config, Some("groq".to_string()), Some("mixtral".to_string()))
            .unwrap(),
        ("groq".to_string(), "mixtral".to_string())
    );
    assert!(chat::pick_target(&app, &config, Some("groq".to_string()), None).is_err());
}

#[tokio::test]
async fn chat_streams_reply_and_continues_session() {
    let transport = Arc::new(
        ScriptedTransport::new().with_chunks("openai/gpt-4o-mini", &["Hello", " there"]),
    );
    let app = scripted_app(
        transport.clone(),
        StaticCredentials::new([("OPENAI_API_KEY", "sk")]),
    );
    let config = Config::default();
    let options = |session| chat::ChatOptions {
        provider: Some("openai".to_string()),
        model: Some("gpt-4o-mini".to_string()),
        session,
        persona: None,
        prompt: "hi".to_string(),
    };

    let (session, stream) = chat::start_chat(&app, &config, options(None)).unwrap();
    let mut out = Vec::new();
    chat::write_reply(stream, &mut out).await.unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "Hello there\n");

    let (same, stream) = chat::start_chat(&app, &config, options(Some(session))).unwrap();
    chat::write_reply(stream, &mut Vec::new()).await.unwrap();
    assert_eq!(same, session);

    let requests = transport.requests();
    let roles: Vec<&str> = requests[1]
        .messages
        .iter()
        .map(|m| m.role.as_str())
        .collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
}

#[test]
fn chat_rejects_unknown_session() {
    let app = scripted_app(Arc::new(ScriptedTransport::new()), StaticCredentials::empty());
    let options = chat::ChatOptions {
        provider: Some("openai".to_string()),
        model: Some("gpt-4o-mini".to_string()),
        session: Some(Uuid::new_v4()),
        persona: None,
        prompt: "hi".to_string(),
    };
    assert!(chat::start_chat(&app, &Config::default(), options).is_err());
}

#[test]
fn default_persona_falls_back() {
    let mut config = Config::default();
    assert_eq!(
        chat::default_persona(&config),
        crate::core::persona::DEFAULT_PERSONA
    );
    config.default_persona = Some("Socratic Tutor".to_string());
    assert_eq!(chat::default_persona(&config), "Socratic Tutor");
}

#[test]
fn arena_results_render_as_sections() {
    let results = vec![
        ContenderResult {
            model: "gpt-4o-mini".to_string(),
            provider: "openai".to_string(),
            content: "Four.\n".to_string(),
            stats: format_stats(0.00012, 42),
            time: Utc::now(),
            persona: "Default".to_string(),
        },
        ContenderResult {
            model: "llama3".to_string(),
            provider: "ollama".to_string(),
            content: "**Error**\n\nconnection refused".to_string(),
            stats: FAILED_STATS.to_string(),
            time: Utc::now(),
            persona: "Default".to_string(),
        },
    ];
    let mut out = Vec::new();
    arena::write_results(&results, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.starts_with("## openai:gpt-4o-mini  💰 $0.00012 | ⚡ 42 tok\n\nFour.\n"));
    assert!(text.contains("## ollama:llama3  ⚠️ Failed"));
}

#[test]
fn usage_summary_output() {
    let mut out = Vec::new();
    usage::write_summary(&UsageSummary::default(), &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "No interactions recorded yet.\n");

    let mut summary = UsageSummary {
        total_cost_usd: 0.5,
        total_tokens: 1200,
        interactions: 3,
        favorite_model: Some("gpt-4o".to_string()),
        ..Default::default()
    };
    summary.cost_by_model.insert("gpt-4o".to_string(), 0.5);
    summary
        .tokens_by_day
        .insert(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), 1200);

    let mut out = Vec::new();
    usage::write_summary(&summary, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Interactions: 3"));
    assert!(text.contains("Estimated cost: $0.50000"));
    assert!(text.contains("Most used model: gpt-4o"));
    assert!(text.contains("  2024-05-01  1200"));
}
