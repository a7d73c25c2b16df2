pub mod duel;
pub mod encounter;
pub mod roll;
pub mod sample;

use std::path::Path;

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use gr_combat::{
    ActionRequest, ActorType, CombatEngine, CombatSession, EngineConfig, ErrorKind, Outcome, ai,
};
use miette::{IntoDiagnostic, WrapErr, miette};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Seed used when neither the command line nor the config names one.
pub const DEFAULT_SEED: u64 = 42;

/// Hard stop for a fight that never ends.
const MAX_TURNS: usize = 500;

/// How a finished fight is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Log and combatant tables.
    Table,
    /// The full session as JSON.
    Json,
    /// The log as markdown.
    Markdown,
}

/// Read and parse a JSON file.
fn load_json<T: DeserializeOwned>(path: &Path) -> miette::Result<T> {
    let text = std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&text)
        .into_diagnostic()
        .wrap_err_with(|| format!("cannot parse {}", path.display()))
}

/// Engine configuration from an optional file, with the seed settled.
fn engine_config(path: Option<&Path>, seed: Option<u64>) -> miette::Result<EngineConfig> {
    let config: EngineConfig = match path {
        Some(path) => load_json(path)?,
        None => EngineConfig::default(),
    };
    let seed = seed.or(config.seed).unwrap_or(DEFAULT_SEED);
    Ok(config.with_seed(seed))
}

/// Seeded dice for the standalone roll commands.
fn dice(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Drive every player turn with the same policy the engine uses for
/// monsters, until the session finishes.
fn autoplay(engine: &CombatEngine, mut session: CombatSession) -> miette::Result<CombatSession> {
    for _ in 0..MAX_TURNS {
        if !session.is_active() {
            return Ok(session);
        }
        let actor = session.current_turn_entity_id;
        let request = ai::choose(&session, actor).expecting(session.version);
        session = match engine.submit_action(session.id, actor, &request) {
            Ok(next) => next,
            Err(err) if err.kind() == ErrorKind::Collaborator => {
                return Err(err).into_diagnostic().wrap_err("fight aborted");
            }
            Err(err) => {
                debug!(error = %err, "autoplay choice rejected, defending instead");
                engine
                    .submit_action(session.id, actor, &ActionRequest::defend())
                    .into_diagnostic()?
            }
        };
    }
    Err(miette!("fight did not finish within {MAX_TURNS} turns"))
}

fn print_session(session: &CombatSession, format: OutputFormat) -> miette::Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(session).into_diagnostic()?;
            println!("{json}");
        }
        OutputFormat::Markdown => print!("{}", session.log.export_markdown()),
        OutputFormat::Table => {
            print_log(session);
            print_combatants(session);
            print_result(session);
        }
    }
    Ok(())
}

fn print_log(session: &CombatSession) {
    println!("  {}", "Combat Log".bold().underline());
    println!();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Round", "Actor", "Action", "Roll", "Detail"]);
    for entry in session.log.entries() {
        let actor = match entry.actor_type {
            ActorType::Player => entry.actor.green().to_string(),
            ActorType::Enemy => entry.actor.red().to_string(),
            ActorType::System => entry.actor.dimmed().to_string(),
        };
        let roll = entry.roll.map(|r| r.to_string()).unwrap_or_default();
        table.add_row(vec![
            entry.round.to_string(),
            actor,
            entry.action.clone(),
            roll,
            entry.message.clone(),
        ]);
    }
    println!("{table}");
    println!();
}

fn print_combatants(session: &CombatSession) {
    println!("  {}", "Combatants".bold().underline());
    println!();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "Type", "HP", "MP", "Effects"]);
    for c in &session.combatants {
        let hp = if c.is_alive() {
            c.hp.to_string()
        } else {
            format!("{} {}", c.hp, "DOWN".red().bold())
        };
        let effects = if c.status_effects.is_empty() {
            "--".to_string()
        } else {
            c.status_effects
                .iter()
                .map(|e| format!("{} ({})", e.name, e.duration))
                .collect::<Vec<_>>()
                .join(", ")
        };
        table.add_row(vec![c.name.clone(), c.kind.to_string(), hp, c.mp.to_string(), effects]);
    }
    println!("{table}");
    println!();
}

fn print_result(session: &CombatSession) {
    let Some(result) = &session.result else {
        println!("  {}", "(unfinished)".dimmed());
        return;
    };
    let headline = match result.outcome {
        Outcome::Victory => "Victory".green().bold(),
        Outcome::Defeat => "Defeat".red().bold(),
        Outcome::Fled => "Fled".yellow().bold(),
    };
    println!(
        "  {} {headline} {}",
        "Result:".bold(),
        format!("(round {})", session.round).dimmed()
    );
    if let Some(xp) = result.xp_gained {
        println!("  XP gained:   {xp}");
    }
    if let Some(gold) = result.gold_gained {
        println!("  Gold gained: {gold}");
    }
    if let Some(xp) = result.xp_lost {
        println!("  XP lost:     {xp}");
    }
    if let Some(gold) = result.gold_lost {
        println!("  Gold lost:   {gold}");
    }
    for drop in &result.loot {
        println!("  Loot:        {} x{} ({:?})", drop.name, drop.quantity, drop.rarity);
    }
}
