//! d20 resolution primitives.
//!
//! Every check here is a pure function of its modifiers and the dice
//! source it is handed:
//! - **Checks**: attack rolls, saving throws and flee checks against a
//!   target number, with the natural 1 / natural 20 override
//! - **Damage**: dice plus modifier, floored at zero, with critical doubling
//! - **Quality**: d20 plus seven bonus terms, bucketed into named tiers

pub mod check;
pub mod damage;
pub mod quality;

pub use check::{AttackRoll, CheckRoll, DEFAULT_FLEE_DC, attack_roll, flee_check, roll, saving_throw};
pub use damage::{DamageRoll, critical_damage_roll, damage_roll};
pub use quality::{QualityBonuses, QualityRoll, QualityTier, quality_roll};
