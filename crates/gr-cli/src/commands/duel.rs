use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use gr_combat::{CombatEngine, CombatantSpec, EntityId, InMemoryLedger, Ledger};
use miette::IntoDiagnostic;

use super::OutputFormat;

/// Options for a single duel.
pub struct DuelArgs {
    pub challenger: Option<PathBuf>,
    pub defender: Option<PathBuf>,
    pub wager: Option<u64>,
    pub purse: u64,
    pub seed: Option<u64>,
    pub config: Option<PathBuf>,
    pub format: OutputFormat,
}

fn sheet(path: Option<&PathBuf>, fallback: CombatantSpec) -> miette::Result<CombatantSpec> {
    let mut spec = match path {
        Some(path) => super::load_json(path)?,
        None => fallback,
    };
    spec.entity_id.get_or_insert_with(EntityId::new);
    Ok(spec)
}

pub fn run(args: &DuelArgs) -> miette::Result<()> {
    let config = super::engine_config(args.config.as_deref(), args.seed)?;
    let (sample_a, sample_b) = super::sample::duelists();
    let challenger = sheet(args.challenger.as_ref(), sample_a)?;
    let defender = sheet(args.defender.as_ref(), sample_b)?;
    let (Some(challenger_id), Some(defender_id)) = (challenger.entity_id, defender.entity_id)
    else {
        return Err(miette::miette!("duelists need character ids"));
    };

    let ledger = Arc::new(InMemoryLedger::new());
    ledger.set_gold(challenger_id, args.purse);
    ledger.set_gold(defender_id, args.purse);

    let engine = CombatEngine::new(config).with_ledger(ledger.clone());
    let challenge = engine
        .challenge(challenger, defender_id, args.wager)
        .into_diagnostic()?;
    let session = engine
        .accept(challenge.session_id, defender)
        .into_diagnostic()?;
    let session = super::autoplay(&engine, session)?;

    if args.format == OutputFormat::Table {
        let stake = session
            .wager
            .map(|w| format!("{w} gold each"))
            .unwrap_or_else(|| "no wager".to_string());
        println!(
            "  {} {} vs {} {}",
            "Duel".bold(),
            challenge.challenger_name,
            session
                .combatant(defender_id)
                .map(|c| c.name.as_str())
                .unwrap_or("?"),
            format!("({stake})").dimmed()
        );
        println!();
    }
    super::print_session(&session, args.format)?;
    if args.format != OutputFormat::Table {
        return Ok(());
    }

    println!();
    for id in [challenger_id, defender_id] {
        let name = session.combatant(id).map(|c| c.name.as_str()).unwrap_or("?");
        let gold = ledger.gold(id).into_diagnostic()?;
        println!("  {name}: {gold} gold");
    }
    println!();

    println!("  {}", "Leaderboard".bold().underline());
    println!();
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Rank", "Name", "W", "L", "Rating"]);
    for row in engine.leaderboard() {
        table.add_row(vec![
            row.rank.to_string(),
            row.character_name,
            row.wins.to_string(),
            row.losses.to_string(),
            row.rating.to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}
