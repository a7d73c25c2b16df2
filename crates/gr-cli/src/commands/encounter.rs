use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use gr_combat::{
    CombatEngine, CombatantKind, CombatantSpec, EntityId, InMemoryInventory, InMemoryLedger, Ledger,
};
use miette::IntoDiagnostic;

use super::OutputFormat;

/// Units of each carried item a player starts the fight with.
const ITEM_STOCK: u32 = 1;

pub fn run(
    roster: Option<&Path>,
    seed: Option<u64>,
    config: Option<&Path>,
    format: OutputFormat,
) -> miette::Result<()> {
    let config = super::engine_config(config, seed)?;
    let mut specs: Vec<CombatantSpec> = match roster {
        Some(path) => super::load_json(path)?,
        None => super::sample::roster(),
    };

    let ledger = Arc::new(InMemoryLedger::new());
    let inventory = Arc::new(InMemoryInventory::new());
    for spec in specs.iter_mut().filter(|s| s.kind == CombatantKind::Player) {
        let id = *spec.entity_id.get_or_insert_with(EntityId::new);
        for item in &spec.items {
            inventory.set_quantity(id, item.id.clone(), ITEM_STOCK);
        }
    }

    let seed = config.seed;
    let engine = CombatEngine::new(config)
        .with_ledger(ledger.clone())
        .with_inventory(inventory);
    let session = engine.start_encounter(specs).into_diagnostic()?;
    let session = super::autoplay(&engine, session)?;

    if format == OutputFormat::Table {
        println!(
            "  {} {}",
            "Encounter".bold(),
            format!("({} combatants, seed={})", session.combatants.len(), seed.unwrap_or_default())
                .dimmed()
        );
        println!();
    }
    super::print_session(&session, format)?;

    if format == OutputFormat::Table {
        println!();
        for player in session.players() {
            let gold = ledger.gold(player.entity_id).into_diagnostic()?;
            let xp = ledger.experience(player.entity_id).into_diagnostic()?;
            println!("  {}: {gold} gold, {xp} XP", player.name);
        }
    }
    Ok(())
}
