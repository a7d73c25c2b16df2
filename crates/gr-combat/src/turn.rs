//! Initiative, the turn pointer, round ticks, and termination.
//!
//! The pointer only ever rests on a living combatant. Each round the order
//! is rebuilt from the initiative ranking minus anyone who went down.

use chrono::{DateTime, Utc};
use gr_mechanics::{DiceSource, roll};
use serde::{Deserialize, Serialize};

use crate::combatant::{Combatant, Side};
use crate::ids::EntityId;
use crate::log::LogDraft;
use crate::session::CombatSession;
use crate::status::StatusKind;

/// Why a session is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "entityId", rename_all = "snake_case")]
pub enum Ending {
    /// Every opposing combatant is down.
    PartyWon,
    /// Every party player is down.
    OppositionWon,
    /// The player escaped.
    Fled(EntityId),
}

/// Where the turn state machine stands after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// The given combatant holds the turn.
    AwaitingTurn(EntityId),
    /// Everyone has acted; the given round has just begun and its ticks
    /// have been applied.
    RoundComplete(u32),
    /// The session is over.
    SessionFinished(Ending),
}

/// Roll `1d20 + DEX` for every combatant. Returns the natural rolls, in
/// roster order, for the log.
pub fn roll_initiative<D: DiceSource + ?Sized>(
    combatants: &mut [Combatant],
    dice: &mut D,
) -> Vec<(EntityId, u32)> {
    combatants
        .iter_mut()
        .map(|c| {
            let natural = roll(dice, 20);
            c.initiative = natural as i32 + c.stats.dex_modifier;
            (c.entity_id, natural)
        })
        .collect()
}

/// Living combatants by initiative, highest first. Ties keep roster order.
pub fn initiative_order(combatants: &[Combatant]) -> Vec<EntityId> {
    let mut living: Vec<&Combatant> = combatants.iter().filter(|c| c.is_alive()).collect();
    living.sort_by(|a, b| b.initiative.cmp(&a.initiative));
    living.iter().map(|c| c.entity_id).collect()
}

/// Decide whether the fight is over.
///
/// The party is checked first, so when both sides drop in the same tick the
/// opposition (the PvP defender) takes the win.
pub fn check_termination(session: &CombatSession) -> Option<Ending> {
    let party_players_up = session
        .players()
        .any(|c| c.side == Side::Party && c.is_alive());
    if !party_players_up {
        return Some(Ending::OppositionWon);
    }
    let opposition_up = session
        .combatants
        .iter()
        .any(|c| c.side == Side::Opposition && c.is_alive());
    if !opposition_up {
        return Some(Ending::PartyWon);
    }
    None
}

/// Move the pointer on by one combatant.
///
/// On wrap the round advances and its ticks are applied, but the new
/// holder's turn is not begun; [`advance`] does that once it has checked
/// the tick did not end the fight.
pub fn step(session: &mut CombatSession, now: DateTime<Utc>) -> TurnPhase {
    if let Some(ending) = check_termination(session) {
        return TurnPhase::SessionFinished(ending);
    }

    let next = (session.turn_index + 1..session.turn_order.len()).find(|&i| {
        session
            .combatant(session.turn_order[i])
            .is_some_and(Combatant::is_alive)
    });

    match next {
        Some(index) => {
            session.turn_index = index;
            session.current_turn_entity_id = session.turn_order[index];
            begin_turn(session, now);
            TurnPhase::AwaitingTurn(session.current_turn_entity_id)
        }
        None => {
            complete_round(session, now);
            TurnPhase::RoundComplete(session.round)
        }
    }
}

/// Hand the turn to the next living combatant, ticking the round if
/// everyone has acted.
pub fn advance(session: &mut CombatSession, now: DateTime<Utc>) -> TurnPhase {
    match step(session, now) {
        TurnPhase::RoundComplete(_) => {
            if let Some(ending) = check_termination(session) {
                return TurnPhase::SessionFinished(ending);
            }
            begin_turn(session, now);
            TurnPhase::AwaitingTurn(session.current_turn_entity_id)
        }
        phase => phase,
    }
}

/// Start-of-turn housekeeping for whoever holds the pointer.
fn begin_turn(session: &mut CombatSession, now: DateTime<Utc>) {
    let id = session.current_turn_entity_id;
    let Some(actor) = session.combatant_mut(id) else {
        return;
    };
    let before = actor.status_effects.len();
    actor
        .status_effects
        .retain(|e| !e.kind.expires_on_owner_turn());
    if actor.status_effects.len() != before {
        let draft = LogDraft::new(
            actor.name.clone(),
            actor.actor_type(),
            "defend_end",
            format!("{} lowers their guard", actor.name),
        );
        session.record(now, draft);
    }
}

fn complete_round(session: &mut CombatSession, now: DateTime<Utc>) {
    session.round += 1;
    let round = session.round;
    session.record(
        now,
        LogDraft::system("round_start", format!("Round {round} begins")),
    );

    let order = session.turn_order.clone();
    for id in order {
        let mut drafts = Vec::new();
        if let Some(c) = session.combatant_mut(id).filter(|c| c.is_alive()) {
            tick_combatant(c, &mut drafts);
        }
        for draft in drafts {
            session.record(now, draft);
        }
    }

    session.turn_order = initiative_order(&session.combatants);
    session.turn_index = 0;
    if let Some(first) = session.turn_order.first() {
        session.current_turn_entity_id = *first;
    }
}

/// Cooldowns and timed effects for one combatant at the round tick.
fn tick_combatant(c: &mut Combatant, drafts: &mut Vec<LogDraft>) {
    c.cooldowns.retain(|_, rounds| {
        *rounds = rounds.saturating_sub(1);
        *rounds > 0
    });

    let mut expired = Vec::new();
    for effect in c.status_effects.iter_mut() {
        if effect.kind.expires_on_owner_turn() {
            continue;
        }
        match effect.kind {
            StatusKind::Poison(amount) => {
                let dealt = c.hp.reduce(amount);
                drafts.push(
                    LogDraft::system(
                        "poison",
                        format!("{} takes {dealt} damage from {}", c.name, effect.name),
                    )
                    .with_damage(dealt),
                );
            }
            StatusKind::Regeneration(amount) => {
                let healed = c.hp.restore(amount);
                drafts.push(
                    LogDraft::system(
                        "regeneration",
                        format!("{} regains {healed} HP from {}", c.name, effect.name),
                    )
                    .with_healing(healed),
                );
            }
            _ => {}
        }
        effect.duration = effect.duration.saturating_sub(1);
        if effect.duration == 0 {
            expired.push(effect.name.clone());
        }
    }

    c.status_effects
        .retain(|e| e.kind.expires_on_owner_turn() || e.duration > 0);
    for name in expired {
        drafts.push(LogDraft::system(
            "effect_end",
            format!("{name} wears off {}", c.name),
        ));
    }
    if !c.is_alive() {
        drafts.push(LogDraft::system("defeated", format!("{} falls", c.name)));
    }
}
