use std::error::Error;
use std::path::Path;

use crate::core::app::Calango;
use crate::core::config::{import_providers, Config};
use crate::core::providers::{route_for, CredentialSource, EnvCredentials};

pub fn list_providers(app: &Calango, config: &Config) -> Result<(), Box<dyn Error>> {
    let names = app.engine.get_configured_providers()?;
    if names.is_empty() {
        println!("No providers configured.");
        return Ok(());
    }

    println!("Configured Providers:");
    println!();
    for name in names {
        let record = app.registry.resolve(&name)?;
        let provider_id = if config
            .default_provider
            .as_ref()
            .is_some_and(|d| d.eq_ignore_ascii_case(&name))
        {
            format!("{name}*")
        } else {
            name.clone()
        };
        let route = route_for(&name);
        let display_name = app
            .engine
            .routes()
            .find(&route.prefix)
            .map_or(name.as_str(), |r| r.display_name());
        let env_key = route.env_key;
        let credential = if EnvCredentials.lookup(&env_key).is_some() {
            format!("{env_key} ✅")
        } else if record.credential.is_empty() {
            "❌".to_string()
        } else {
            "stored ✅".to_string()
        };
        println!(
            "  {provider_id} ({display_name})  [{credential}]  {}",
            record.allowed_models.join(", ")
        );
    }

    if config.default_provider.is_some() {
        println!();
        println!("* = default provider");
    }
    Ok(())
}

pub fn import(app: &Calango, path: &Path) -> Result<(), Box<dyn Error>> {
    let count = import_providers(path, &app.registry, &EnvCredentials)?;
    println!("✅ Imported {count} provider(s)");
    Ok(())
}

pub fn set_provider(
    app: &Calango,
    name: &str,
    key: Option<&str>,
    models: Vec<String>,
) -> Result<(), Box<dyn Error>> {
    let models: Vec<String> = models
        .into_iter()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();
    if models.is_empty() {
        return Err(format!("Provider '{name}' needs at least one model").into());
    }

    let record = app.registry.upsert(name, key.unwrap_or_default(), models)?;
    println!(
        "✅ Saved provider '{}' with {} model(s)",
        record.name,
        record.allowed_models.len()
    );
    Ok(())
}
