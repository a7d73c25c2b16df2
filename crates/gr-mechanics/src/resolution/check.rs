//! d20 checks against a target number.
//!
//! A natural 20 always succeeds and a natural 1 always fails. This override
//! wins over the arithmetic comparison, whatever the modifier or target.

use serde::{Deserialize, Serialize};

use crate::dice::{DiceSource, Die};

/// Difficulty of a flee check when none is given.
pub const DEFAULT_FLEE_DC: i32 = 10;

/// Roll a single die with `sides` sides.
pub fn roll<D: DiceSource + ?Sized>(dice: &mut D, sides: u32) -> u32 {
    dice.roll_die(sides)
}

/// Success rule shared by every d20 check.
fn d20_succeeds(natural: u32, total: i32, target: i32) -> bool {
    match natural {
        20 => true,
        1 => false,
        _ => total >= target,
    }
}

fn natural_d20<D: DiceSource + ?Sized>(dice: &mut D) -> (u32, i32) {
    let natural = Die::D20.roll(dice);
    // d20 results always fit in an i32
    (natural, natural as i32)
}

/// The outcome of an attack roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackRoll {
    /// The face shown on the d20.
    pub natural: u32,
    /// Attack modifier added to the die.
    pub modifier: i32,
    /// `natural + modifier`.
    pub total: i32,
    /// Armor class the attack was made against.
    pub armor_class: i32,
    /// Whether the attack connects.
    pub hit: bool,
    /// Whether the attack is a critical hit (natural 20).
    pub critical: bool,
}

/// Roll 1d20 + `attack_modifier` against `target_ac`.
pub fn attack_roll<D: DiceSource + ?Sized>(
    dice: &mut D,
    attack_modifier: i32,
    target_ac: i32,
) -> AttackRoll {
    let (natural, face) = natural_d20(dice);
    let total = face.saturating_add(attack_modifier);
    AttackRoll {
        natural,
        modifier: attack_modifier,
        total,
        armor_class: target_ac,
        hit: d20_succeeds(natural, total, target_ac),
        critical: natural == 20,
    }
}

/// The outcome of a saving throw or flee check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRoll {
    /// The face shown on the d20.
    pub natural: u32,
    /// Modifier added to the die.
    pub modifier: i32,
    /// `natural + modifier`.
    pub total: i32,
    /// Difficulty class.
    pub dc: i32,
    /// Whether the check succeeds.
    pub success: bool,
}

/// Roll 1d20 + `modifier` against `dc`.
pub fn saving_throw<D: DiceSource + ?Sized>(dice: &mut D, modifier: i32, dc: i32) -> CheckRoll {
    let (natural, face) = natural_d20(dice);
    let total = face.saturating_add(modifier);
    CheckRoll {
        natural,
        modifier,
        total,
        dc,
        success: d20_succeeds(natural, total, dc),
    }
}

/// Roll a DEX-based check to escape combat. Pass [`DEFAULT_FLEE_DC`] when
/// the encounter sets no difficulty of its own.
pub fn flee_check<D: DiceSource + ?Sized>(dice: &mut D, dex_modifier: i32, dc: i32) -> CheckRoll {
    saving_throw(dice, dex_modifier, dc)
}
