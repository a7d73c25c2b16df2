//! Append-only combat log.
//!
//! The order of entries is the authoritative event sequence clients replay
//! for animation. Entries are never edited or removed once appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    /// A player or one of the party's allies.
    Player,
    /// A monster.
    Enemy,
    /// The engine itself (round ticks, status effects, outcomes).
    System,
}

/// One event in the combat log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Monotonic within the session, starting at 1.
    pub id: u64,
    /// Round the event happened in.
    pub round: u32,
    /// Name of the acting combatant, or "System".
    pub actor: String,
    /// Kind of actor.
    pub actor_type: ActorType,
    /// Short machine-readable action name ("attack", "damage", ...).
    pub action: String,
    /// The natural die roll, when one was made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<u32>,
    /// Damage dealt, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<u32>,
    /// Healing done, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healing: Option<u32>,
    /// Human-readable description.
    pub message: String,
    /// When the entry was appended.
    pub timestamp: DateTime<Utc>,
}

/// An entry waiting to be appended. The log assigns id, round and time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDraft {
    actor: String,
    actor_type: ActorType,
    action: String,
    roll: Option<u32>,
    damage: Option<u32>,
    healing: Option<u32>,
    message: String,
}

impl LogDraft {
    /// Start a draft.
    pub fn new(
        actor: impl Into<String>,
        actor_type: ActorType,
        action: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            actor: actor.into(),
            actor_type,
            action: action.into(),
            roll: None,
            damage: None,
            healing: None,
            message: message.into(),
        }
    }

    /// A draft attributed to the engine.
    pub fn system(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new("System", ActorType::System, action, message)
    }

    /// Attach a die roll.
    pub fn with_roll(mut self, roll: u32) -> Self {
        self.roll = Some(roll);
        self
    }

    /// Attach damage dealt.
    pub fn with_damage(mut self, damage: u32) -> Self {
        self.damage = Some(damage);
        self
    }

    /// Attach healing done.
    pub fn with_healing(mut self, healing: u32) -> Self {
        self.healing = Some(healing);
        self
    }
}

/// The ordered record of everything that happened in a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombatLog {
    entries: Vec<LogEntry>,
}

impl CombatLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a draft, returning the id it was given.
    pub fn append(&mut self, round: u32, timestamp: DateTime<Utc>, draft: LogDraft) -> u64 {
        let id = self.entries.last().map(|e| e.id + 1).unwrap_or(1);
        self.entries.push(LogEntry {
            id,
            round,
            actor: draft.actor,
            actor_type: draft.actor_type,
            action: draft.action,
            roll: draft.roll,
            damage: draft.damage,
            healing: draft.healing,
            message: draft.message,
            timestamp,
        });
        id
    }

    /// Get all entries.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries appended after `id`, for clients that replay incrementally.
    pub fn since(&self, id: u64) -> &[LogEntry] {
        let start = self.entries.partition_point(|e| e.id <= id);
        &self.entries[start..]
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Export the log as markdown, one section per round.
    pub fn export_markdown(&self) -> String {
        let mut out = String::from("# Combat Log\n\n");
        let mut round = 0;
        for entry in &self.entries {
            if entry.round != round {
                round = entry.round;
                out.push_str(&format!("## Round {round}\n\n"));
            }
            let mut details = Vec::new();
            if let Some(roll) = entry.roll {
                details.push(format!("roll {roll}"));
            }
            if let Some(damage) = entry.damage {
                details.push(format!("{damage} damage"));
            }
            if let Some(healing) = entry.healing {
                details.push(format!("{healing} healing"));
            }
            out.push_str(&format!("- **{}** {}", entry.actor, entry.message));
            if !details.is_empty() {
                out.push_str(&format!(" *({})*", details.join(", ")));
            }
            out.push('\n');
        }
        out
    }

    /// Export the log as plain text.
    pub fn export_text(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!(
                "[{:>3}] R{} {}: {}\n",
                entry.id, entry.round, entry.actor, entry.message
            ));
        }
        out
    }
}
