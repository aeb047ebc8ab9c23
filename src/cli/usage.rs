use std::error::Error;
use std::io::Write;

use crate::core::app::Calango;
use crate::core::interactions::UsageSummary;

pub fn print_usage(app: &Calango) -> Result<(), Box<dyn Error>> {
    let summary = app.interactions.usage_summary()?;
    let mut stdout = std::io::stdout().lock();
    write_summary(&summary, &mut stdout)?;
    Ok(())
}

pub(crate) fn write_summary<W: Write>(summary: &UsageSummary, out: &mut W) -> std::io::Result<()> {
    if summary.interactions == 0 {
        return writeln!(out, "No interactions recorded yet.");
    }

    writeln!(out, "Interactions: {}", summary.interactions)?;
    writeln!(out, "Total tokens: {}", summary.total_tokens)?;
    writeln!(out, "Estimated cost: ${:.5}", summary.total_cost_usd)?;
    if let Some(model) = &summary.favorite_model {
        writeln!(out, "Most used model: {model}")?;
    }

    writeln!(out)?;
    writeln!(out, "Cost by model:")?;
    for (model, cost) in &summary.cost_by_model {
        writeln!(out, "  {model}  ${cost:.5}")?;
    }

    writeln!(out)?;
    writeln!(out, "Tokens by day:")?;
    for (day, tokens) in &summary.tokens_by_day {
        writeln!(out, "  {day}  {tokens}")?;
    }
    Ok(())
}
