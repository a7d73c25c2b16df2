//! Dice types, pools, expressions, and randomness sources.
//!
//! Supports standard polyhedral dice (d4 through d100) and custom dice.
//! All rolling goes through a [`DiceSource`], so callers can swap a seeded
//! RNG for a scripted sequence of forced values.

pub mod expr;
pub mod pool;
pub mod roll;
pub mod source;

pub use expr::{DiceExpr, MAX_DICE};
pub use pool::DicePool;
pub use roll::{DieResult, RollResult};
pub use source::{DiceSource, ScriptedDice};

use serde::{Deserialize, Serialize};

/// A polyhedral die type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Die {
    /// Four-sided die.
    D4,
    /// Six-sided die.
    D6,
    /// Eight-sided die.
    D8,
    /// Ten-sided die.
    D10,
    /// Twelve-sided die.
    D12,
    /// Twenty-sided die.
    D20,
    /// Percentile die (1-100).
    D100,
    /// A die with a custom number of sides.
    Custom(u32),
}

impl Die {
    /// Returns the number of sides on this die.
    pub fn sides(self) -> u32 {
        match self {
            Self::D4 => 4,
            Self::D6 => 6,
            Self::D8 => 8,
            Self::D10 => 10,
            Self::D12 => 12,
            Self::D20 => 20,
            Self::D100 => 100,
            Self::Custom(n) => n,
        }
    }

    /// Map a side count onto the matching standard die, or `Custom`.
    pub fn from_sides(sides: u32) -> Self {
        match sides {
            4 => Self::D4,
            6 => Self::D6,
            8 => Self::D8,
            10 => Self::D10,
            12 => Self::D12,
            20 => Self::D20,
            100 => Self::D100,
            n => Self::Custom(n),
        }
    }

    /// Roll this die once.
    pub fn roll<D: DiceSource + ?Sized>(self, dice: &mut D) -> u32 {
        dice.roll_die(self.sides())
    }
}

impl std::fmt::Display for Die {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "d{}", self.sides())
    }
}
