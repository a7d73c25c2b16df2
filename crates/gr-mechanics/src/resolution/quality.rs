//! Quality rolls shared by crafting and combat-adjacent checks.
//!
//! A quality roll is 1d20 plus seven additive bonuses. The total lands in
//! one of six tiers. [`QualityTier::from_total`] is the only place the tier
//! thresholds live.

use serde::{Deserialize, Serialize};

use crate::dice::{DiceSource, Die};

/// Named quality tiers, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Total below 16.
    Poor,
    /// Total 16 to 25.
    Common,
    /// Total 26 to 35.
    Fine,
    /// Total 36 to 45.
    Superior,
    /// Total 46 to 55.
    Masterwork,
    /// Total 56 or more.
    Legendary,
}

impl QualityTier {
    /// Lowest total for each tier above `Poor`, in ascending order.
    const THRESHOLDS: [(i32, QualityTier); 5] = [
        (16, QualityTier::Common),
        (26, QualityTier::Fine),
        (36, QualityTier::Superior),
        (46, QualityTier::Masterwork),
        (56, QualityTier::Legendary),
    ];

    /// Bucket a roll total into its tier.
    pub fn from_total(total: i32) -> Self {
        Self::THRESHOLDS
            .iter()
            .rev()
            .find(|(min, _)| total >= *min)
            .map(|(_, tier)| *tier)
            .unwrap_or(QualityTier::Poor)
    }

    /// The lowest total that reaches this tier, or `None` for `Poor`.
    pub fn min_total(self) -> Option<i32> {
        Self::THRESHOLDS
            .iter()
            .find(|(_, tier)| *tier == self)
            .map(|(min, _)| *min)
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Poor => "Poor",
            Self::Common => "Common",
            Self::Fine => "Fine",
            Self::Superior => "Superior",
            Self::Masterwork => "Masterwork",
            Self::Legendary => "Legendary",
        };
        write!(f, "{name}")
    }
}

/// The seven additive terms of a quality roll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QualityBonuses {
    /// Crafter's skill level.
    pub skill: i32,
    /// Tool bonus.
    pub tool: i32,
    /// Workstation bonus.
    pub station: i32,
    /// Bonus from material quality.
    pub materials: i32,
    /// Recipe mastery bonus.
    pub mastery: i32,
    /// Temporary buffs.
    pub buffs: i32,
    /// Luck.
    pub luck: i32,
}

impl QualityBonuses {
    /// Sum of all seven terms.
    pub fn total(&self) -> i32 {
        [
            self.skill,
            self.tool,
            self.station,
            self.materials,
            self.mastery,
            self.buffs,
            self.luck,
        ]
        .iter()
        .fold(0i32, |acc, b| acc.saturating_add(*b))
    }
}

/// The outcome of a quality roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityRoll {
    /// The face shown on the d20.
    pub natural: u32,
    /// Sum of the bonus terms.
    pub bonus: i32,
    /// `natural + bonus`.
    pub total: i32,
    /// The resulting tier.
    pub tier: QualityTier,
}

/// Roll 1d20 plus all bonus terms and bucket the result.
pub fn quality_roll<D: DiceSource + ?Sized>(dice: &mut D, bonuses: &QualityBonuses) -> QualityRoll {
    let natural = Die::D20.roll(dice);
    let bonus = bonuses.total();
    let total = (natural as i32).saturating_add(bonus);
    QualityRoll {
        natural,
        bonus,
        total,
        tier: QualityTier::from_total(total),
    }
}
