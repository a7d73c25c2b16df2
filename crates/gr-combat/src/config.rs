//! Configuration for a combat engine.

use chrono::Duration;
use gr_mechanics::DEFAULT_FLEE_DC;
use serde::{Deserialize, Serialize};

/// What a PvE defeat costs, as percentages of current balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DefeatPenalty {
    /// Percent of gold lost (0-100).
    pub gold_percent: u32,
    /// Percent of experience lost (0-100).
    pub xp_percent: u32,
}

impl Default for DefeatPenalty {
    fn default() -> Self {
        Self {
            gold_percent: 10,
            xp_percent: 5,
        }
    }
}

impl DefeatPenalty {
    /// Amounts lost from the given balances, rounded down.
    pub fn apply(&self, gold: u64, xp: u64) -> (u64, u64) {
        (
            gold.saturating_mul(u64::from(self.gold_percent)) / 100,
            xp.saturating_mul(u64::from(self.xp_percent)) / 100,
        )
    }
}

/// Configuration for a combat engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Base RNG seed. Each session gets its own stream derived from it.
    /// `None` seeds from the OS.
    pub seed: Option<u64>,
    /// How long a PvP challenge stays open, in seconds.
    pub challenge_ttl_secs: u64,
    /// PvE defeat penalty.
    pub defeat_penalty: DefeatPenalty,
    /// Difficulty of escaping a fight.
    pub flee_dc: i32,
    /// Rating new duelists start with.
    pub initial_rating: i32,
    /// Elo K-factor.
    pub rating_k: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            challenge_ttl_secs: 300,
            defeat_penalty: DefeatPenalty::default(),
            flee_dc: DEFAULT_FLEE_DC,
            initial_rating: 1000,
            rating_k: 32.0,
        }
    }
}

impl EngineConfig {
    /// Seed the engine for reproducible fights.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the challenge time-to-live (at least one second).
    pub fn with_challenge_ttl(mut self, secs: u64) -> Self {
        self.challenge_ttl_secs = secs.max(1);
        self
    }

    /// Set the defeat penalty (percentages clamped to 100).
    pub fn with_defeat_penalty(mut self, gold_percent: u32, xp_percent: u32) -> Self {
        self.defeat_penalty = DefeatPenalty {
            gold_percent: gold_percent.min(100),
            xp_percent: xp_percent.min(100),
        };
        self
    }

    /// Set the flee difficulty.
    pub fn with_flee_dc(mut self, dc: i32) -> Self {
        self.flee_dc = dc;
        self
    }

    /// Set the starting rating and K-factor.
    pub fn with_rating(mut self, initial: i32, k: f64) -> Self {
        self.initial_rating = initial;
        self.rating_k = k;
        self
    }

    /// Challenge time-to-live as a duration.
    pub fn challenge_ttl(&self) -> Duration {
        Duration::seconds(i64::try_from(self.challenge_ttl_secs).unwrap_or(i64::MAX))
    }
}
