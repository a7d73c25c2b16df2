//! Dice and d20 resolution primitives for Gloamreach.
//!
//! Provides dice types and pools, `NdS±M` expressions, attack rolls,
//! saving throws, flee checks, damage rolls with critical doubling,
//! crafting quality rolls, and clamped vital tracks. Nothing here holds
//! state beyond the [`DiceSource`] it is handed.

pub mod dice;
pub mod error;
pub mod resolution;
pub mod track;

pub use dice::{
    DiceExpr, DicePool, DiceSource, Die, DieResult, MAX_DICE, RollResult, ScriptedDice,
};
pub use error::{MechError, MechResult};
pub use resolution::{
    AttackRoll, CheckRoll, DEFAULT_FLEE_DC, DamageRoll, QualityBonuses, QualityRoll, QualityTier,
    attack_roll, critical_damage_roll, damage_roll, flee_check, quality_roll, roll, saving_throw,
};
pub use track::Track;
