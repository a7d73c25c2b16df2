//! Error types for the combat engine.
//!
//! Every rejected request maps onto one [`ErrorKind`], which tells a caller
//! whether to fix the request, refetch state, or drop its local copy.

use crate::ids::{EntityId, SessionId};
use crate::inventory::InventoryError;
use crate::ledger::LedgerError;
use crate::session::CombatType;

/// Broad classes of failure, as seen by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed request. Rejected before any mutation, safe to retry once fixed.
    Validation,
    /// The request is well-formed but not legal right now.
    IllegalState,
    /// The session moved on since the caller last read it. Refetch and retry.
    ConcurrencyConflict,
    /// The session or challenge does not exist (or expired).
    NotFound,
    /// An external collaborator (ledger, inventory) failed.
    Collaborator,
}

/// Errors that can occur while running combat.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The action name is not one of the supported actions.
    #[error("unknown action: \"{0}\"")]
    UnknownAction(String),

    /// A required request field was not supplied.
    #[error("{action} requires {field}")]
    MissingField {
        /// The action being submitted.
        action: &'static str,
        /// The missing field.
        field: &'static str,
    },

    /// The actor does not know the requested spell.
    #[error("unknown spell: {0}")]
    UnknownSpell(String),

    /// The actor does not carry the requested item.
    #[error("unknown item: {0}")]
    UnknownItem(String),

    /// The chosen target cannot receive this action.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// A roster cannot form a valid session.
    #[error("invalid roster: {0}")]
    InvalidRoster(String),

    /// A challenge request is malformed.
    #[error("invalid challenge: {0}")]
    InvalidChallenge(String),

    /// The session has already finished.
    #[error("session {0} is not active")]
    SessionNotActive(SessionId),

    /// Someone other than the active combatant tried to act.
    #[error("not your turn: {actor} tried to act during {current}'s turn")]
    NotYourTurn {
        /// Who tried to act.
        actor: EntityId,
        /// Whose turn it is.
        current: EntityId,
    },

    /// The caster cannot pay the spell's MP cost.
    #[error("insufficient mana for {spell}: costs {cost}, {available} available")]
    InsufficientMana {
        /// Spell name.
        spell: String,
        /// MP cost.
        cost: u32,
        /// MP the caster has.
        available: u32,
    },

    /// The spell was cast too recently.
    #[error("{spell} is on cooldown for {rounds} more round(s)")]
    SpellOnCooldown {
        /// Spell name.
        spell: String,
        /// Rounds left.
        rounds: u32,
    },

    /// The item's inventory quantity is zero.
    #[error("no {0} left")]
    ItemDepleted(String),

    /// Fleeing is only possible against monsters.
    #[error("fleeing is not allowed in {0} combat")]
    FleeNotAllowed(CombatType),

    /// The character already has an active session on this track.
    #[error("{0} is already in {1} combat")]
    AlreadyInCombat(EntityId, CombatType),

    /// The session's result was already computed and paid out.
    #[error("session {0} has already been finalized")]
    AlreadyFinalized(SessionId),

    /// The same two characters already have a pending challenge.
    #[error("a challenge from {challenger} to {target} is already pending")]
    DuplicateChallenge {
        /// Challenging character.
        challenger: EntityId,
        /// Challenged character.
        target: EntityId,
    },

    /// The caller's view of the session is stale.
    #[error("session changed: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// Version the caller based its request on.
        expected: u64,
        /// Current version.
        actual: u64,
    },

    /// No session with this id.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// No pending challenge with this id, or it expired.
    #[error("challenge not found: {0}")]
    ChallengeNotFound(SessionId),

    /// The character has no session on this track.
    #[error("{player} has no active {combat_type} session")]
    NoActiveSession {
        /// The character.
        player: EntityId,
        /// Which track was queried.
        combat_type: CombatType,
    },

    /// The referenced combatant is not part of the session.
    #[error("combatant not found: {0}")]
    CombatantNotFound(EntityId),

    /// The gold/XP ledger rejected or failed a transfer.
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    /// The inventory collaborator failed.
    #[error("inventory: {0}")]
    Inventory(#[from] InventoryError),
}

impl EngineError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownAction(_)
            | Self::MissingField { .. }
            | Self::UnknownSpell(_)
            | Self::UnknownItem(_)
            | Self::InvalidTarget(_)
            | Self::InvalidRoster(_)
            | Self::InvalidChallenge(_) => ErrorKind::Validation,
            Self::SessionNotActive(_)
            | Self::NotYourTurn { .. }
            | Self::InsufficientMana { .. }
            | Self::SpellOnCooldown { .. }
            | Self::ItemDepleted(_)
            | Self::FleeNotAllowed(_)
            | Self::AlreadyInCombat(..)
            | Self::AlreadyFinalized(_)
            | Self::DuplicateChallenge { .. } => ErrorKind::IllegalState,
            Self::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            Self::SessionNotFound(_)
            | Self::ChallengeNotFound(_)
            | Self::NoActiveSession { .. }
            | Self::CombatantNotFound(_) => ErrorKind::NotFound,
            Self::Ledger(LedgerError::InsufficientGold { .. }) => ErrorKind::IllegalState,
            Self::Inventory(InventoryError::Depleted { .. }) => ErrorKind::IllegalState,
            Self::Ledger(_) | Self::Inventory(_) => ErrorKind::Collaborator,
        }
    }
}

/// Convenience result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
