//! PvP standings with Elo ratings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

/// One row of the public leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub rank: u32,
    /// Character id.
    pub character_id: EntityId,
    /// Character name at their last duel.
    pub character_name: String,
    /// Duels won.
    pub wins: u32,
    /// Duels lost.
    pub losses: u32,
    /// Elo rating, rounded.
    pub rating: i32,
}

#[derive(Debug, Clone)]
struct Record {
    name: String,
    wins: u32,
    losses: u32,
    rating: f64,
}

/// Chance that a player rated `rating` beats one rated `opponent`.
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) / 400.0))
}

/// Win/loss records and ratings for everyone who has dueled.
#[derive(Debug, Clone)]
pub struct Leaderboard {
    records: HashMap<EntityId, Record>,
    initial_rating: f64,
    k: f64,
}

impl Leaderboard {
    /// Create an empty leaderboard.
    pub fn new(initial_rating: i32, k: f64) -> Self {
        Self {
            records: HashMap::new(),
            initial_rating: f64::from(initial_rating),
            k,
        }
    }

    fn record(&mut self, id: EntityId, name: &str) -> &mut Record {
        let initial = self.initial_rating;
        let record = self.records.entry(id).or_insert_with(|| Record {
            name: name.to_string(),
            wins: 0,
            losses: 0,
            rating: initial,
        });
        record.name = name.to_string();
        record
    }

    /// Record a finished duel and update both ratings.
    pub fn record_duel(
        &mut self,
        winner: EntityId,
        winner_name: &str,
        loser: EntityId,
        loser_name: &str,
    ) {
        let winner_rating = self.record(winner, winner_name).rating;
        let loser_rating = self.record(loser, loser_name).rating;
        let delta = self.k * (1.0 - expected_score(winner_rating, loser_rating));

        let w = self.record(winner, winner_name);
        w.wins += 1;
        w.rating += delta;
        let l = self.record(loser, loser_name);
        l.losses += 1;
        l.rating -= delta;
    }

    /// Current rating of a character, if they have dueled.
    pub fn rating(&self, id: EntityId) -> Option<i32> {
        self.records.get(&id).map(|r| r.rating.round() as i32)
    }

    /// Everyone, best first: by rating, then wins, then name.
    pub fn standings(&self) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<(EntityId, &Record)> = self.records.iter().map(|(id, r)| (*id, r)).collect();
        rows.sort_by(|(_, a), (_, b)| {
            b.rating
                .total_cmp(&a.rating)
                .then(b.wins.cmp(&a.wins))
                .then_with(|| a.name.cmp(&b.name))
        });
        rows.into_iter()
            .zip(1u32..)
            .map(|((id, r), rank)| LeaderboardEntry {
                rank,
                character_id: id,
                character_name: r.name.clone(),
                wins: r.wins,
                losses: r.losses,
                rating: r.rating.round() as i32,
            })
            .collect()
    }

    /// Number of ranked characters.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nobody has dueled yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
