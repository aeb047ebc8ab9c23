//! Arena battles from the command line

use std::error::Error;
use std::io::Write;

use crate::core::app::Calango;
use crate::core::arena::{Contender, ContenderResult};

pub async fn run_arena(
    app: &Calango,
    prompt: &str,
    contenders: &[Contender],
    persona: &str,
    save: bool,
) -> Result<(), Box<dyn Error>> {
    let system_prompt = app.personas.prompt_for(persona)?;
    let results = app
        .arena
        .run_battle_round(prompt, contenders, &system_prompt, persona)
        .await;

    let mut stdout = std::io::stdout().lock();
    write_results(&results, &mut stdout)?;

    if save {
        let round = app.arena.save_round(prompt, results)?;
        println!("Saved round {}", round.id);
    }
    Ok(())
}

pub fn list_rounds(app: &Calango) -> Result<(), Box<dyn Error>> {
    let rounds = app.arena.rounds()?;
    if rounds.is_empty() {
        println!("No saved arena rounds.");
        return Ok(());
    }

    for round in rounds {
        println!(
            "{}  {}  {}",
            round.id,
            round.created_at.format("%Y-%m-%d %H:%M"),
            round.prompt.lines().next().unwrap_or_default()
        );
        for result in &round.results {
            println!("    {}:{}  {}", result.provider, result.model, result.stats);
        }
    }
    Ok(())
}

pub(crate) fn write_results<W: Write>(
    results: &[ContenderResult],
    out: &mut W,
) -> std::io::Result<()> {
    for result in results {
        writeln!(out, "## {}:{}  {}", result.provider, result.model, result.stats)?;
        writeln!(out)?;
        writeln!(out, "{}", result.content.trim_end())?;
        writeln!(out)?;
    }
    Ok(())
}
