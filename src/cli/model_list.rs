//! Model listing functionality
//!
//! Models come from the allowed list stored with each provider; nothing is
//! fetched from the provider itself.

use std::error::Error;

use crate::core::app::Calango;
use crate::core::config::Config;

pub fn list_models(
    app: &Calango,
    config: &Config,
    provider: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let provider = provider
        .or_else(|| config.default_provider.clone())
        .ok_or("No provider given and no default-provider set")?;

    let models = app.engine.get_models_for_provider(&provider)?;
    if models.is_empty() {
        println!("No models configured for provider '{provider}'.");
        return Ok(());
    }

    let default_model = config.default_model_for(&provider);
    println!("Models for {provider}:");
    for model in models {
        let marker = if default_model == Some(model.as_str()) { "*" } else { "" };
        println!("  {model}{marker}");
    }
    if default_model.is_some() {
        println!();
        println!("* = default model");
    }
    Ok(())
}
