//! Turning an ending into a result and a ledger batch.
//!
//! A session is finalized exactly once. The caller applies the returned
//! transfers atomically and only then commits the finished session.

use chrono::{DateTime, Utc};
use gr_mechanics::{DiceSource, roll};
use tracing::info;

use crate::combatant::{Combatant, Side};
use crate::config::DefeatPenalty;
use crate::error::{EngineError, EngineResult};
use crate::ids::EntityId;
use crate::ledger::{Ledger, Transfer};
use crate::log::LogDraft;
use crate::session::{CombatResult, CombatSession, CombatType, LootDrop, Outcome, SessionStatus};
use crate::turn::Ending;

/// Finish `session` according to `ending`.
///
/// Sets the status and result, appends the closing log entry, and returns
/// the transfers the ledger must apply. Fails with `AlreadyFinalized` if a
/// result already exists, so a session can never pay out twice.
pub fn finalize<D: DiceSource + ?Sized>(
    session: &mut CombatSession,
    ending: Ending,
    ledger: &dyn Ledger,
    penalty: DefeatPenalty,
    dice: &mut D,
    now: DateTime<Utc>,
) -> EngineResult<Vec<Transfer>> {
    if session.result.is_some() {
        return Err(EngineError::AlreadyFinalized(session.id));
    }

    let (result, transfers) = match (session.combat_type, ending) {
        (_, Ending::Fled(_)) => (CombatResult::bare(Outcome::Fled), Vec::new()),
        (CombatType::Pve, Ending::PartyWon) => pve_victory(session, dice),
        (CombatType::Pve, Ending::OppositionWon) => pve_defeat(session, ledger, penalty)?,
        (CombatType::Pvp, ending) => pvp_result(session, ending),
    };

    let message = match result.outcome {
        Outcome::Victory => "Victory!",
        Outcome::Defeat => "Defeat.",
        Outcome::Fled => "Escaped the fight.",
    };
    session.record(now, LogDraft::system("combat_end", message));
    info!(
        session = %session.id,
        combat_type = %session.combat_type,
        outcome = %result.outcome,
        transfers = transfers.len(),
        "session finished"
    );
    session.status = SessionStatus::Finished;
    session.result = Some(result);
    Ok(transfers)
}

fn party_players(session: &CombatSession) -> impl Iterator<Item = &Combatant> {
    session.players().filter(|c| c.side == Side::Party)
}

fn pve_victory<D: DiceSource + ?Sized>(
    session: &CombatSession,
    dice: &mut D,
) -> (CombatResult, Vec<Transfer>) {
    let defeated: Vec<&Combatant> = session
        .combatants
        .iter()
        .filter(|c| c.side == Side::Opposition && !c.is_alive())
        .collect();

    let mut xp = 0u64;
    let mut gold = 0u64;
    let mut loot = Vec::new();
    for enemy in &defeated {
        let Some(rewards) = &enemy.rewards else {
            continue;
        };
        xp = xp.saturating_add(rewards.xp);
        gold = gold.saturating_add(rewards.gold);
        for drop in &rewards.drops {
            if roll(dice, 100) <= drop.chance {
                loot.push(LootDrop {
                    name: drop.name.clone(),
                    quantity: drop.quantity,
                    rarity: drop.rarity,
                });
            }
        }
    }

    let mut transfers = Vec::new();
    for player in party_players(session) {
        if xp > 0 {
            transfers.push(Transfer::GrantXp {
                character: player.entity_id,
                amount: xp,
            });
        }
        if gold > 0 {
            transfers.push(Transfer::CreditGold {
                character: player.entity_id,
                amount: gold,
            });
        }
    }

    let result = CombatResult {
        xp_gained: Some(xp),
        gold_gained: Some(gold),
        loot,
        ..CombatResult::bare(Outcome::Victory)
    };
    (result, transfers)
}

fn pve_defeat(
    session: &CombatSession,
    ledger: &dyn Ledger,
    penalty: DefeatPenalty,
) -> EngineResult<(CombatResult, Vec<Transfer>)> {
    let mut transfers = Vec::new();
    let mut reported = None;
    for player in party_players(session) {
        let gold = ledger.gold(player.entity_id)?;
        let xp = ledger.experience(player.entity_id)?;
        let (gold_lost, xp_lost) = penalty.apply(gold, xp);
        if gold_lost > 0 {
            transfers.push(Transfer::DebitGold {
                character: player.entity_id,
                amount: gold_lost,
            });
        }
        if xp_lost > 0 {
            transfers.push(Transfer::RevokeXp {
                character: player.entity_id,
                amount: xp_lost,
            });
        }
        reported.get_or_insert((gold_lost, xp_lost));
    }

    let (gold_lost, xp_lost) = reported.unwrap_or_default();
    let result = CombatResult {
        gold_lost: Some(gold_lost),
        xp_lost: Some(xp_lost),
        ..CombatResult::bare(Outcome::Defeat)
    };
    Ok((result, transfers))
}

/// Duel result from the challenger's side. The winner takes the whole pot.
fn pvp_result(session: &CombatSession, ending: Ending) -> (CombatResult, Vec<Transfer>) {
    let challenger = session.player_on(Side::Party).map(|c| c.entity_id);
    let defender = session.player_on(Side::Opposition).map(|c| c.entity_id);
    let challenger_won = ending == Ending::PartyWon;
    let (winner, loser): (Option<EntityId>, Option<EntityId>) = if challenger_won {
        (challenger, defender)
    } else {
        (defender, challenger)
    };

    let stake = session.wager.unwrap_or(0);
    let pot = stake.saturating_mul(2);
    let mut transfers = Vec::new();
    if let Some(winner) = winner.filter(|_| pot > 0) {
        transfers.push(Transfer::CreditGold {
            character: winner,
            amount: pot,
        });
    }

    let (gold_gained, gold_lost) = match (challenger_won, stake) {
        (_, 0) => (None, None),
        (true, _) => (Some(pot), None),
        (false, _) => (None, Some(stake)),
    };
    let result = CombatResult {
        gold_gained,
        gold_lost,
        winner_id: winner,
        loser_id: loser,
        ..CombatResult::bare(if challenger_won {
            Outcome::Victory
        } else {
            Outcome::Defeat
        })
    };
    (result, transfers)
}
