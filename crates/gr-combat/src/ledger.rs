//! Gold and experience ledger collaborator.
//!
//! The engine never owns character balances. It hands the ledger batches of
//! [`Transfer`]s that must apply atomically: escrow when a duel starts,
//! payouts and penalties when a session finishes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::ids::EntityId;

/// A single balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transfer {
    /// Add gold to a character.
    CreditGold {
        /// Receiving character.
        character: EntityId,
        /// Amount of gold.
        amount: u64,
    },
    /// Remove gold from a character. Fails the batch if the balance is short.
    DebitGold {
        /// Paying character.
        character: EntityId,
        /// Amount of gold.
        amount: u64,
    },
    /// Award experience.
    GrantXp {
        /// Receiving character.
        character: EntityId,
        /// Amount of XP.
        amount: u64,
    },
    /// Remove experience, never below zero.
    RevokeXp {
        /// Penalized character.
        character: EntityId,
        /// Amount of XP.
        amount: u64,
    },
}

/// Errors reported by a ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The ledger could not be reached.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// A debit exceeds the character's balance.
    #[error("{character} has {balance} gold, needs {needed}")]
    InsufficientGold {
        /// The character.
        character: EntityId,
        /// Current balance.
        balance: u64,
        /// Amount required.
        needed: u64,
    },
}

/// External store of character gold and XP.
pub trait Ledger: Send + Sync {
    /// Current gold balance.
    fn gold(&self, character: EntityId) -> Result<u64, LedgerError>;

    /// Current experience total.
    fn experience(&self, character: EntityId) -> Result<u64, LedgerError>;

    /// Apply every transfer or none of them.
    fn apply(&self, transfers: &[Transfer]) -> Result<(), LedgerError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Account {
    gold: u64,
    xp: u64,
}

/// Ledger kept in process memory, for tests and local runs.
#[derive(Debug)]
pub struct InMemoryLedger {
    accounts: Mutex<HashMap<EntityId, Account>>,
    available: AtomicBool,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Set a character's gold balance.
    pub fn set_gold(&self, character: EntityId, gold: u64) {
        self.accounts.lock().entry(character).or_default().gold = gold;
    }

    /// Set a character's experience total.
    pub fn set_experience(&self, character: EntityId, xp: u64) {
        self.accounts.lock().entry(character).or_default().xp = xp;
    }

    /// Simulate an outage. While unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), LedgerError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LedgerError::Unavailable("in-memory ledger offline".to_string()))
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger for InMemoryLedger {
    fn gold(&self, character: EntityId) -> Result<u64, LedgerError> {
        self.check_available()?;
        Ok(self
            .accounts
            .lock()
            .get(&character)
            .map(|a| a.gold)
            .unwrap_or(0))
    }

    fn experience(&self, character: EntityId) -> Result<u64, LedgerError> {
        self.check_available()?;
        Ok(self
            .accounts
            .lock()
            .get(&character)
            .map(|a| a.xp)
            .unwrap_or(0))
    }

    fn apply(&self, transfers: &[Transfer]) -> Result<(), LedgerError> {
        self.check_available()?;
        let mut accounts = self.accounts.lock();

        // Stage every change on copies, then write back only if all succeed.
        let mut staged: HashMap<EntityId, Account> = HashMap::new();
        for transfer in transfers {
            let character = match transfer {
                Transfer::CreditGold { character, .. }
                | Transfer::DebitGold { character, .. }
                | Transfer::GrantXp { character, .. }
                | Transfer::RevokeXp { character, .. } => *character,
            };
            let account = staged
                .entry(character)
                .or_insert_with(|| accounts.get(&character).copied().unwrap_or_default());
            match *transfer {
                Transfer::CreditGold { amount, .. } => {
                    account.gold = account.gold.saturating_add(amount);
                }
                Transfer::DebitGold { amount, .. } => {
                    if account.gold < amount {
                        return Err(LedgerError::InsufficientGold {
                            character,
                            balance: account.gold,
                            needed: amount,
                        });
                    }
                    account.gold -= amount;
                }
                Transfer::GrantXp { amount, .. } => {
                    account.xp = account.xp.saturating_add(amount);
                }
                Transfer::RevokeXp { amount, .. } => {
                    account.xp = account.xp.saturating_sub(amount);
                }
            }
        }

        accounts.extend(staged);
        Ok(())
    }
}
