//! Clamped vitals (HP, MP).
//!
//! A track is a numeric resource that never leaves `[0, max]`. Every
//! mutation clamps, and reports how much actually changed.

use serde::{Deserialize, Serialize};

/// A resource clamped between zero and its maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Current value.
    pub current: u32,
    /// Maximum value.
    pub max: u32,
}

impl Track {
    /// Create a track starting at its maximum value.
    pub fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Create a track with a custom starting value, clamped to `max`.
    pub fn with_current(current: u32, max: u32) -> Self {
        Self {
            current: current.min(max),
            max,
        }
    }

    /// Remove up to `amount`. Returns how much was actually removed.
    pub fn reduce(&mut self, amount: u32) -> u32 {
        let applied = amount.min(self.current);
        self.current -= applied;
        applied
    }

    /// Add up to `amount` without passing `max`. Returns how much was added.
    pub fn restore(&mut self, amount: u32) -> u32 {
        let applied = amount.min(self.max - self.current);
        self.current += applied;
        applied
    }

    /// Spend exactly `amount` if available. Returns false and leaves the
    /// track untouched otherwise.
    pub fn spend(&mut self, amount: u32) -> bool {
        if self.current < amount {
            return false;
        }
        self.current -= amount;
        true
    }

    /// Returns true if the track is at zero.
    pub fn is_empty(&self) -> bool {
        self.current == 0
    }

    /// Returns true if the track is at its maximum value.
    pub fn is_full(&self) -> bool {
        self.current >= self.max
    }

    /// Returns the fraction of the track that is filled (0.0 to 1.0).
    pub fn fraction(&self) -> f64 {
        if self.max == 0 {
            return 1.0;
        }
        f64::from(self.current) / f64::from(self.max)
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.current, self.max)
    }
}
