//! Pending PvP challenges.
//!
//! Expired challenges are purged on every access, so callers never see or
//! accept one past its deadline.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::combatant::CombatantSpec;
use crate::error::{EngineError, EngineResult};
use crate::ids::{EntityId, SessionId};

/// A duel offer waiting for the target's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvpChallenge {
    /// Id the session will take once accepted.
    pub session_id: SessionId,
    /// Challenging character.
    pub challenger_id: EntityId,
    /// Challenger's display name.
    pub challenger_name: String,
    /// Challenged character.
    pub target_id: EntityId,
    /// Gold each side stakes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wager: Option<u64>,
    /// When the challenge was issued.
    pub created_at: DateTime<Utc>,
    /// When it lapses.
    pub expires_at: DateTime<Utc>,
}

impl PvpChallenge {
    /// Whether the challenge has lapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone)]
struct Pending {
    challenge: PvpChallenge,
    challenger: CombatantSpec,
}

/// All open challenges, keyed by their future session id.
#[derive(Debug, Default)]
pub struct ChallengeBoard {
    pending: HashMap<SessionId, Pending>,
}

impl ChallengeBoard {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every challenge that has lapsed. Returns how many were dropped.
    pub fn purge(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.pending.len();
        self.pending.retain(|id, p| {
            let keep = !p.challenge.is_expired(now);
            if !keep {
                warn!(challenge = %id, challenger = %p.challenge.challenger_id, "challenge expired");
            }
            keep
        });
        before - self.pending.len()
    }

    /// Post a challenge from `challenger` (whose snapshot is kept for the
    /// duel) to `target`.
    pub fn open(
        &mut self,
        challenger: CombatantSpec,
        target: EntityId,
        wager: Option<u64>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> EngineResult<PvpChallenge> {
        self.purge(now);
        let challenger_id = challenger.entity_id.ok_or_else(|| {
            EngineError::InvalidChallenge("challenger has no character id".to_string())
        })?;
        if challenger_id == target {
            return Err(EngineError::InvalidChallenge(
                "cannot challenge yourself".to_string(),
            ));
        }
        let duplicate = self
            .pending
            .values()
            .any(|p| p.challenge.challenger_id == challenger_id && p.challenge.target_id == target);
        if duplicate {
            return Err(EngineError::DuplicateChallenge {
                challenger: challenger_id,
                target,
            });
        }

        let challenge = PvpChallenge {
            session_id: SessionId::new(),
            challenger_id,
            challenger_name: challenger.name.clone(),
            target_id: target,
            wager: wager.filter(|w| *w > 0),
            created_at: now,
            expires_at: now + ttl,
        };
        self.pending.insert(
            challenge.session_id,
            Pending {
                challenge: challenge.clone(),
                challenger,
            },
        );
        Ok(challenge)
    }

    /// Challenges directed at `target`, oldest first.
    pub fn for_target(&mut self, target: EntityId, now: DateTime<Utc>) -> Vec<PvpChallenge> {
        self.purge(now);
        let mut found: Vec<PvpChallenge> = self
            .pending
            .values()
            .filter(|p| p.challenge.target_id == target)
            .map(|p| p.challenge.clone())
            .collect();
        found.sort_by_key(|c| (c.created_at, c.session_id));
        found
    }

    /// Look up a live challenge and the challenger's snapshot.
    pub fn get(
        &mut self,
        id: SessionId,
        now: DateTime<Utc>,
    ) -> EngineResult<(PvpChallenge, CombatantSpec)> {
        self.purge(now);
        self.pending
            .get(&id)
            .map(|p| (p.challenge.clone(), p.challenger.clone()))
            .ok_or(EngineError::ChallengeNotFound(id))
    }

    /// Remove a live challenge.
    pub fn remove(&mut self, id: SessionId, now: DateTime<Utc>) -> EngineResult<PvpChallenge> {
        self.purge(now);
        self.pending
            .remove(&id)
            .map(|p| p.challenge)
            .ok_or(EngineError::ChallengeNotFound(id))
    }

    /// Number of challenges on the board, expired or not.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the board is empty.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::CombatantKind;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn duelist(name: &str) -> CombatantSpec {
        CombatantSpec::new(name, CombatantKind::Player, 30).with_id(EntityId::new())
    }

    fn ttl() -> Duration {
        Duration::seconds(300)
    }

    #[test]
    fn open_and_list_for_target() {
        let mut board = ChallengeBoard::new();
        let aria = duelist("Aria");
        let brann = EntityId::new();
        let c = board.open(aria.clone(), brann, Some(50), ttl(), now()).unwrap();
        assert_eq!(c.challenger_name, "Aria");
        assert_eq!(c.expires_at, now() + ttl());
        assert_eq!(board.for_target(brann, now()), vec![c]);
        assert!(board.for_target(aria.entity_id.unwrap(), now()).is_empty());
    }

    #[test]
    fn self_challenge_rejected() {
        let mut board = ChallengeBoard::new();
        let aria = duelist("Aria");
        let id = aria.entity_id.unwrap();
        let err = board.open(aria, id, None, ttl(), now()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidChallenge(_)));
    }

    #[test]
    fn duplicate_challenge_rejected() {
        let mut board = ChallengeBoard::new();
        let aria = duelist("Aria");
        let brann = EntityId::new();
        board.open(aria.clone(), brann, None, ttl(), now()).unwrap();
        let err = board.open(aria, brann, None, ttl(), now()).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateChallenge { .. }));
    }

    #[test]
    fn zero_wager_is_no_wager() {
        let mut board = ChallengeBoard::new();
        let c = board
            .open(duelist("Aria"), EntityId::new(), Some(0), ttl(), now())
            .unwrap();
        assert_eq!(c.wager, None);
    }

    #[test]
    fn expired_challenges_vanish() {
        let mut board = ChallengeBoard::new();
        let brann = EntityId::new();
        let c = board.open(duelist("Aria"), brann, None, ttl(), now()).unwrap();
        let later = now() + ttl();
        assert!(board.for_target(brann, later).is_empty());
        assert!(board.is_empty());
        assert!(matches!(
            board.get(c.session_id, later),
            Err(EngineError::ChallengeNotFound(_))
        ));
    }

    #[test]
    fn get_keeps_and_remove_takes() {
        let mut board = ChallengeBoard::new();
        let c = board
            .open(duelist("Aria"), EntityId::new(), None, ttl(), now())
            .unwrap();
        let (found, spec) = board.get(c.session_id, now()).unwrap();
        assert_eq!(found, c);
        assert_eq!(spec.name, "Aria");
        assert_eq!(board.len(), 1);
        board.remove(c.session_id, now()).unwrap();
        assert!(board.remove(c.session_id, now()).is_err());
    }
}
