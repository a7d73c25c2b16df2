//! Timed status effects.

use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

/// What a status effect does while it lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "amount", rename_all = "snake_case")]
pub enum StatusKind {
    /// Halves incoming damage. Removed when its owner's next turn begins.
    Defending,
    /// Adds to (or, if negative, subtracts from) armor class.
    Armor(i32),
    /// Adds to (or subtracts from) attack rolls.
    Attack(i32),
    /// Loses this much HP at each round tick.
    Poison(u32),
    /// Regains this much HP at each round tick.
    Regeneration(u32),
}

impl StatusKind {
    /// Whether this effect expires on its owner's turn rather than on the
    /// round tick.
    pub fn expires_on_owner_turn(self) -> bool {
        matches!(self, Self::Defending)
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defending => write!(f, "defending"),
            Self::Armor(n) => write!(f, "armor {n:+}"),
            Self::Attack(n) => write!(f, "attack {n:+}"),
            Self::Poison(n) => write!(f, "poison {n}"),
            Self::Regeneration(n) => write!(f, "regeneration {n}"),
        }
    }
}

/// A timed modifier attached to a combatant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEffect {
    /// Display name ("Stoneskin", "Defending", ...).
    pub name: String,
    /// What the effect does.
    pub kind: StatusKind,
    /// Remaining rounds.
    pub duration: u32,
    /// Who applied it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<EntityId>,
}

impl StatusEffect {
    /// Create an effect.
    pub fn new(name: impl Into<String>, kind: StatusKind, duration: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            duration,
            source: None,
        }
    }

    /// The one-round defensive stance.
    pub fn defending() -> Self {
        Self::new("Defending", StatusKind::Defending, 1)
    }

    /// Record who applied the effect.
    pub fn from_source(mut self, source: EntityId) -> Self {
        self.source = Some(source);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defending_lasts_one_round_and_expires_on_owner_turn() {
        let d = StatusEffect::defending();
        assert_eq!(d.duration, 1);
        assert!(d.kind.expires_on_owner_turn());
        assert!(!StatusKind::Poison(2).expires_on_owner_turn());
    }

    #[test]
    fn kind_display() {
        assert_eq!(StatusKind::Armor(2).to_string(), "armor +2");
        assert_eq!(StatusKind::Attack(-3).to_string(), "attack -3");
        assert_eq!(StatusKind::Poison(4).to_string(), "poison 4");
    }

    #[test]
    fn kind_serializes_adjacently_tagged() {
        let json = serde_json::to_string(&StatusKind::Armor(2)).unwrap();
        assert_eq!(json, r#"{"type":"armor","amount":2}"#);
        let back: StatusKind = serde_json::from_str(r#"{"type":"defending"}"#).unwrap();
        assert_eq!(back, StatusKind::Defending);
    }
}
