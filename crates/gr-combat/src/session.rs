//! Combat sessions and their results.
//!
//! A [`CombatSession`] is the full authoritative state of one encounter.
//! Every engine call returns a complete copy of it, never a diff.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use gr_mechanics::DiceSource;
use serde::{Deserialize, Serialize};

use crate::combatant::{Combatant, CombatantKind, Rarity, Side};
use crate::error::{EngineError, EngineResult};
use crate::ids::{EntityId, SessionId};
use crate::log::{CombatLog, LogDraft};
use crate::turn;

/// Whether a session is still being fought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepting actions.
    Active,
    /// Over; `result` is set.
    Finished,
}

/// The two independent combat tracks a character can be on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatType {
    /// Players against monsters.
    Pve,
    /// A duel between two players.
    Pvp,
}

impl std::fmt::Display for CombatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pve => write!(f, "pve"),
            Self::Pvp => write!(f, "pvp"),
        }
    }
}

/// How a session ended, from the point of view of the party (the PvE
/// player, or the PvP challenger).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The party won.
    Victory,
    /// The party lost.
    Defeat,
    /// The player escaped.
    Fled,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Victory => write!(f, "victory"),
            Self::Defeat => write!(f, "defeat"),
            Self::Fled => write!(f, "fled"),
        }
    }
}

/// An item won from a drop table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LootDrop {
    /// Item name.
    pub name: String,
    /// How many.
    pub quantity: u32,
    /// Rarity.
    pub rarity: Rarity,
}

/// The final accounting of a session. Computed once, never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatResult {
    /// How it ended.
    pub outcome: Outcome,
    /// Experience awarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp_gained: Option<u64>,
    /// Gold awarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gold_gained: Option<u64>,
    /// Experience lost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp_lost: Option<u64>,
    /// Gold lost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gold_lost: Option<u64>,
    /// Items won, in drop-table order.
    #[serde(default)]
    pub loot: Vec<LootDrop>,
    /// Winning player (PvP).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<EntityId>,
    /// Losing player (PvP).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loser_id: Option<EntityId>,
}

impl CombatResult {
    /// A result with nothing gained or lost.
    pub fn bare(outcome: Outcome) -> Self {
        Self {
            outcome,
            xp_gained: None,
            gold_gained: None,
            xp_lost: None,
            gold_lost: None,
            loot: Vec::new(),
            winner_id: None,
            loser_id: None,
        }
    }
}

/// A spell a player could cast right now, echoed for the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableSpell {
    /// Caster.
    pub owner: EntityId,
    /// Spell id.
    pub spell_id: String,
    /// Display name.
    pub name: String,
    /// MP cost.
    pub mp_cost: u32,
    /// Castable now (enough MP, off cooldown).
    pub ready: bool,
}

/// An item a player carries, with its current inventory quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableItem {
    /// Holder.
    pub owner: EntityId,
    /// Item id.
    pub item_id: String,
    /// Display name.
    pub name: String,
    /// Units left.
    pub quantity: u32,
}

/// The full state of one encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatSession {
    /// Session id.
    pub id: SessionId,
    /// Active or finished.
    pub status: SessionStatus,
    /// PvE or PvP.
    pub combat_type: CombatType,
    /// Current round, starting at 1.
    pub round: u32,
    /// Whose turn it is.
    pub current_turn_entity_id: EntityId,
    /// Initiative order for the current round.
    pub turn_order: Vec<EntityId>,
    pub(crate) turn_index: usize,
    /// Participants in insertion order.
    pub combatants: Vec<Combatant>,
    /// Everything that happened so far.
    pub log: CombatLog,
    /// Gold each duelist put in escrow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wager: Option<u64>,
    /// Set once the session finishes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CombatResult>,
    /// Bumped on every committed change.
    pub version: u64,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Spells the players could cast. Filled in on read.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_spells: Vec<AvailableSpell>,
    /// Items the players carry. Filled in on read.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_items: Vec<AvailableItem>,
}

impl CombatSession {
    /// Validate a roster, roll initiative and open the session at round 1.
    ///
    /// The first combatant in initiative order holds the turn, even if it is
    /// AI-controlled; the engine resolves such turns before returning.
    pub fn start<D: DiceSource + ?Sized>(
        id: SessionId,
        combat_type: CombatType,
        mut combatants: Vec<Combatant>,
        wager: Option<u64>,
        dice: &mut D,
        now: DateTime<Utc>,
    ) -> EngineResult<Self> {
        validate_roster(combat_type, &combatants)?;
        let rolls = turn::roll_initiative(&mut combatants, dice);
        let turn_order = turn::initiative_order(&combatants);
        let current = turn_order[0];

        let mut session = Self {
            id,
            status: SessionStatus::Active,
            combat_type,
            round: 1,
            current_turn_entity_id: current,
            turn_order,
            turn_index: 0,
            combatants,
            log: CombatLog::new(),
            wager,
            result: None,
            version: 0,
            created_at: now,
            available_spells: Vec::new(),
            available_items: Vec::new(),
        };

        session.record(now, LogDraft::system("combat_start", "Combat begins"));
        for (entity_id, natural) in rolls {
            if let Some(c) = session.combatant(entity_id) {
                let draft = LogDraft::new(
                    c.name.clone(),
                    c.actor_type(),
                    "initiative",
                    format!("{} rolls initiative: {}", c.name, c.initiative),
                )
                .with_roll(natural);
                session.record(now, draft);
            }
        }
        Ok(session)
    }

    /// Whether the session still accepts actions.
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Look up a combatant.
    pub fn combatant(&self, id: EntityId) -> Option<&Combatant> {
        self.combatants.iter().find(|c| c.entity_id == id)
    }

    /// Look up a combatant mutably.
    pub fn combatant_mut(&mut self, id: EntityId) -> Option<&mut Combatant> {
        self.combatants.iter_mut().find(|c| c.entity_id == id)
    }

    /// The combatant whose turn it is.
    pub fn current_actor(&self) -> Option<&Combatant> {
        self.combatant(self.current_turn_entity_id)
    }

    /// Living combatants on `side`, in turn order.
    pub fn living_on(&self, side: Side) -> Vec<&Combatant> {
        self.turn_order
            .iter()
            .filter_map(|id| self.combatant(*id))
            .filter(|c| c.side == side && c.is_alive())
            .collect()
    }

    /// Player-controlled combatants.
    pub fn players(&self) -> impl Iterator<Item = &Combatant> {
        self.combatants.iter().filter(|c| c.is_player())
    }

    /// The player on the given side (the duelists in PvP, the hero in PvE).
    pub fn player_on(&self, side: Side) -> Option<&Combatant> {
        self.players().find(|c| c.side == side)
    }

    /// Append to the log, stamped with the current round.
    pub fn record(&mut self, now: DateTime<Utc>, draft: LogDraft) -> u64 {
        self.log.append(self.round, now, draft)
    }
}

fn validate_roster(combat_type: CombatType, combatants: &[Combatant]) -> EngineResult<()> {
    if combatants.is_empty() {
        return Err(EngineError::InvalidRoster("roster is empty".to_string()));
    }

    let mut seen = HashSet::new();
    for c in combatants {
        if !seen.insert(c.entity_id) {
            return Err(EngineError::InvalidRoster(format!(
                "{} appears twice",
                c.name
            )));
        }
        if !c.is_alive() {
            return Err(EngineError::InvalidRoster(format!(
                "{} cannot start a fight at 0 HP",
                c.name
            )));
        }
    }

    let count = |kind: CombatantKind, side: Side| {
        combatants
            .iter()
            .filter(|c| c.kind == kind && c.side == side)
            .count()
    };

    match combat_type {
        CombatType::Pve => {
            if count(CombatantKind::Player, Side::Party) == 0 {
                return Err(EngineError::InvalidRoster(
                    "a PvE roster needs a player".to_string(),
                ));
            }
            if count(CombatantKind::Enemy, Side::Opposition) == 0 {
                return Err(EngineError::InvalidRoster(
                    "a PvE roster needs an enemy".to_string(),
                ));
            }
            if combatants
                .iter()
                .any(|c| (c.kind == CombatantKind::Enemy) != (c.side == Side::Opposition))
            {
                return Err(EngineError::InvalidRoster(
                    "enemies must make up the opposition".to_string(),
                ));
            }
        }
        CombatType::Pvp => {
            let valid = combatants.len() == 2
                && count(CombatantKind::Player, Side::Party) == 1
                && count(CombatantKind::Player, Side::Opposition) == 1;
            if !valid {
                return Err(EngineError::InvalidRoster(
                    "a duel needs exactly two players on opposing sides".to_string(),
                ));
            }
        }
    }
    Ok(())
}
