//! `NdS±M` dice expressions.
//!
//! Rosters and item definitions describe damage and healing as compact
//! strings such as `2d6+3`, `d20` or `4d8-1`. A bare integer like `5` is a
//! flat amount with no dice.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MechError;
use crate::resolution::{DamageRoll, critical_damage_roll, damage_roll};

use super::DiceSource;

/// Most dice a parsed expression may roll. A critical doubles this.
pub const MAX_DICE: u32 = 100;

/// A parsed dice expression: `count` dice of `sides` sides plus `modifier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DiceExpr {
    /// Number of dice rolled.
    pub count: u32,
    /// Sides per die.
    pub sides: u32,
    /// Flat modifier added once to the total.
    pub modifier: i32,
}

impl DiceExpr {
    /// Build an expression from its parts.
    pub fn new(count: u32, sides: u32, modifier: i32) -> Self {
        Self {
            count,
            sides,
            modifier,
        }
    }

    /// A flat amount with no dice.
    pub fn flat(amount: i32) -> Self {
        Self::new(0, 1, amount)
    }

    /// Roll the expression as damage, doubling the dice on a critical.
    pub fn roll<D: DiceSource + ?Sized>(&self, dice: &mut D, critical: bool) -> DamageRoll {
        if critical {
            critical_damage_roll(dice, self.count, self.sides, self.modifier)
        } else {
            damage_roll(dice, self.count, self.sides, self.modifier)
        }
    }

}

impl fmt::Display for DiceExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            return write!(f, "{}", self.modifier);
        }
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{m}"),
            m => write!(f, "{m}"),
        }
    }
}

impl FromStr for DiceExpr {
    type Err = MechError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let lower = compact.to_lowercase();
        if lower.is_empty() {
            return Err(MechError::InvalidExpression(s.to_string()));
        }

        let Some(d_pos) = lower.find('d') else {
            let amount = lower
                .parse::<i32>()
                .map_err(|_| MechError::InvalidExpression(s.to_string()))?;
            return Ok(Self::flat(amount));
        };

        let (count_part, rest) = lower.split_at(d_pos);
        let rest = &rest[1..];
        let count = if count_part.is_empty() {
            1
        } else {
            count_part
                .parse::<u32>()
                .map_err(|_| MechError::InvalidExpression(s.to_string()))?
        };
        if count > MAX_DICE {
            return Err(MechError::InvalidDice(format!(
                "at most {MAX_DICE} dice per expression, got {count}"
            )));
        }

        let (sides_part, modifier) = match rest.find(['+', '-']) {
            Some(pos) => {
                let (sides, modifier) = rest.split_at(pos);
                let modifier = modifier
                    .parse::<i32>()
                    .map_err(|_| MechError::InvalidExpression(s.to_string()))?;
                (sides, modifier)
            }
            None => (rest, 0),
        };

        let sides = sides_part
            .parse::<u32>()
            .map_err(|_| MechError::InvalidExpression(s.to_string()))?;
        if sides < 2 {
            return Err(MechError::InvalidDice(format!(
                "a die needs at least 2 sides, got {sides}"
            )));
        }

        Ok(Self::new(count, sides, modifier))
    }
}

impl TryFrom<String> for DiceExpr {
    type Error = MechError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DiceExpr> for String {
    fn from(value: DiceExpr) -> Self {
        value.to_string()
    }
}
