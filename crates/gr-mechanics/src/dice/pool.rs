//! Dice pool construction and rolling.

use super::roll::{DieResult, RollResult};
use super::{DiceSource, Die};

/// A collection of dice to be rolled together.
#[derive(Debug, Clone, Default)]
pub struct DicePool {
    /// The dice in this pool.
    pub dice: Vec<Die>,
}

impl DicePool {
    /// Create an empty dice pool.
    pub fn new() -> Self {
        Self { dice: Vec::new() }
    }

    /// Add `count` dice of the given type.
    pub fn add(mut self, die: Die, count: u32) -> Self {
        for _ in 0..count {
            self.dice.push(die);
        }
        self
    }

    /// Returns how many dice are in the pool.
    pub fn count(&self) -> usize {
        self.dice.len()
    }

    /// Returns true if the pool has no dice.
    pub fn is_empty(&self) -> bool {
        self.dice.is_empty()
    }

    /// Roll every die in the pool independently.
    pub fn roll<D: DiceSource + ?Sized>(&self, source: &mut D) -> RollResult {
        let dice = self
            .dice
            .iter()
            .map(|&die| DieResult {
                die,
                value: die.roll(source),
            })
            .collect();
        RollResult { dice }
    }
}
