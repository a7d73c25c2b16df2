//! Randomness sources for dice rolls.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Anything that can produce a uniform die result.
///
/// Implementations must return a value in `1..=sides`. A `sides` of 0 is
/// treated as 1.
pub trait DiceSource {
    /// Roll a single die with the given number of sides.
    fn roll_die(&mut self, sides: u32) -> u32;
}

impl DiceSource for StdRng {
    fn roll_die(&mut self, sides: u32) -> u32 {
        self.random_range(1..=sides.max(1))
    }
}

impl<D: DiceSource + ?Sized> DiceSource for Box<D> {
    fn roll_die(&mut self, sides: u32) -> u32 {
        (**self).roll_die(sides)
    }
}

/// A dice source that replays a fixed sequence of values.
///
/// Scripted values are clamped to the die being rolled, so forcing a 20 on a
/// d6 yields 6. Once the script runs out, rolls fall back to a seeded RNG so
/// long-running scenarios stay deterministic.
#[derive(Debug, Clone)]
pub struct ScriptedDice {
    queue: VecDeque<u32>,
    fallback: StdRng,
}

impl ScriptedDice {
    /// Create a source that yields `values` in order.
    pub fn new(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            queue: values.into_iter().collect(),
            fallback: StdRng::seed_from_u64(0),
        }
    }

    /// Replace the seed used once the script is exhausted.
    pub fn with_fallback_seed(mut self, seed: u64) -> Self {
        self.fallback = StdRng::seed_from_u64(seed);
        self
    }

    /// Append more forced values to the end of the script.
    pub fn push(&mut self, value: u32) {
        self.queue.push_back(value);
    }

    /// Number of scripted values not yet consumed.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl DiceSource for ScriptedDice {
    fn roll_die(&mut self, sides: u32) -> u32 {
        let sides = sides.max(1);
        match self.queue.pop_front() {
            Some(value) => value.clamp(1, sides),
            None => self.fallback.roll_die(sides),
        }
    }
}
