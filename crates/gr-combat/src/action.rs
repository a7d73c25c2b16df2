//! Action requests submitted by players.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::ids::EntityId;

/// The five things a combatant can do on its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Weapon attack.
    Attack,
    /// Cast a known spell.
    CastSpell,
    /// Use a carried item.
    UseItem,
    /// Brace for a round, halving incoming damage.
    Defend,
    /// Try to escape (PvE only).
    Flee,
}

impl ActionKind {
    /// Wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attack => "attack",
            Self::CastSpell => "cast_spell",
            Self::UseItem => "use_item",
            Self::Defend => "defend",
            Self::Flee => "flee",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "attack" => Ok(Self::Attack),
            "cast_spell" => Ok(Self::CastSpell),
            "use_item" => Ok(Self::UseItem),
            "defend" => Ok(Self::Defend),
            "flee" => Ok(Self::Flee),
            _ => Err(EngineError::UnknownAction(s.to_string())),
        }
    }
}

/// A submitted action with its options.
///
/// `action` stays a string on the wire so an unknown name is reported as a
/// validation error rather than a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    /// Action name (`attack`, `cast_spell`, `use_item`, `defend`, `flee`).
    pub action: String,
    /// Spell to cast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spell_id: Option<String>,
    /// Item to use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    /// Explicit target. Defaults depend on the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<EntityId>,
    /// Session version the caller last saw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
}

impl ActionRequest {
    /// A request with no options.
    pub fn new(kind: ActionKind) -> Self {
        Self {
            action: kind.as_str().to_string(),
            ..Self::default()
        }
    }

    /// A weapon attack.
    pub fn attack() -> Self {
        Self::new(ActionKind::Attack)
    }

    /// Cast `spell_id`.
    pub fn cast(spell_id: impl Into<String>) -> Self {
        Self {
            spell_id: Some(spell_id.into()),
            ..Self::new(ActionKind::CastSpell)
        }
    }

    /// Use `item_id`.
    pub fn use_item(item_id: impl Into<String>) -> Self {
        Self {
            item_id: Some(item_id.into()),
            ..Self::new(ActionKind::UseItem)
        }
    }

    /// Take a defensive stance.
    pub fn defend() -> Self {
        Self::new(ActionKind::Defend)
    }

    /// Try to run.
    pub fn flee() -> Self {
        Self::new(ActionKind::Flee)
    }

    /// Aim at a specific combatant.
    pub fn at(mut self, target: EntityId) -> Self {
        self.target_id = Some(target);
        self
    }

    /// Require the session to be at `version`.
    pub fn expecting(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Parse the action name.
    pub fn kind(&self) -> Result<ActionKind, EngineError> {
        self.action.parse()
    }
}
