//! Server-authoritative turn-based combat for Gloamreach.
//!
//! A [`CombatEngine`] owns every live session. Clients submit
//! [`ActionRequest`]s; the engine validates them against the current turn,
//! resolves them with the d20 rules from `gr_mechanics`, plays out enemy
//! and ally turns, and settles rewards, penalties and wagers through the
//! [`Ledger`] and [`Inventory`] collaborators. PvP duels go through a
//! challenge board and feed an Elo leaderboard.

pub mod action;
pub mod ai;
pub mod challenge;
pub mod clock;
pub mod combatant;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod finalize;
pub mod ids;
pub mod inventory;
pub mod leaderboard;
pub mod ledger;
pub mod log;
pub mod resolver;
pub mod session;
pub mod status;
pub mod turn;

pub use action::{ActionKind, ActionRequest};
pub use challenge::PvpChallenge;
pub use clock::{Clock, ManualClock, SystemClock};
pub use combatant::{
    CombatItem, CombatStats, Combatant, CombatantKind, CombatantSpec, DropEntry, ItemEffect,
    Rarity, RewardTable, Side, Spell, SpellDelivery, SpellEffect,
};
pub use config::{DefeatPenalty, EngineConfig};
pub use engine::{CombatEngine, DiceFactory};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use events::{EventSink, NullSink, RESULT_EVENT, RecordingSink, ResultEvent, SinkError};
pub use ids::{EntityId, SessionId};
pub use inventory::{InMemoryInventory, Inventory, InventoryError};
pub use leaderboard::LeaderboardEntry;
pub use ledger::{InMemoryLedger, Ledger, LedgerError, Transfer};
pub use log::{ActorType, CombatLog, LogEntry};
pub use session::{
    AvailableItem, AvailableSpell, CombatResult, CombatSession, CombatType, LootDrop, Outcome,
    SessionStatus,
};
pub use status::{StatusEffect, StatusKind};
pub use turn::{Ending, TurnPhase};
