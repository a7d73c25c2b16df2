//! Damage and healing rolls.

use serde::{Deserialize, Serialize};

use crate::dice::{DicePool, DiceSource, Die, RollResult};

/// The result of a damage roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageRoll {
    /// The individual dice rolled (already doubled on a critical).
    pub dice: RollResult,
    /// The flat modifier, applied once.
    pub modifier: i32,
    /// Dice sum plus modifier, floored at zero.
    pub total: u32,
    /// Whether the dice were doubled.
    pub critical: bool,
}

fn roll_pool<D: DiceSource + ?Sized>(
    source: &mut D,
    count: u32,
    sides: u32,
    modifier: i32,
    critical: bool,
) -> DamageRoll {
    let dice = if sides == 0 {
        RollResult::default()
    } else {
        DicePool::new().add(Die::from_sides(sides), count).roll(source)
    };
    let raw = i64::from(dice.total()) + i64::from(modifier);
    DamageRoll {
        dice,
        modifier,
        total: u32::try_from(raw.max(0)).unwrap_or(u32::MAX),
        critical,
    }
}

/// Roll `count`d`sides` + `modifier`. The total never goes below zero.
pub fn damage_roll<D: DiceSource + ?Sized>(
    dice: &mut D,
    count: u32,
    sides: u32,
    modifier: i32,
) -> DamageRoll {
    roll_pool(dice, count, sides, modifier, false)
}

/// Like [`damage_roll`] with the dice count doubled. The modifier is not
/// doubled.
pub fn critical_damage_roll<D: DiceSource + ?Sized>(
    dice: &mut D,
    count: u32,
    sides: u32,
    modifier: i32,
) -> DamageRoll {
    roll_pool(dice, count.saturating_mul(2), sides, modifier, true)
}
