//! Inventory collaborator.
//!
//! Item definitions travel with the combatant snapshot. Quantities are
//! owned by the inventory service and only read or decremented here.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::ids::EntityId;

/// Errors reported by an inventory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    /// The owner has none of this item left.
    #[error("{owner} has no {item_id} left")]
    Depleted {
        /// Item owner.
        owner: EntityId,
        /// Item identifier.
        item_id: String,
    },

    /// The inventory service could not be reached.
    #[error("inventory unavailable: {0}")]
    Unavailable(String),
}

/// External store of item quantities.
pub trait Inventory: Send + Sync {
    /// How many of `item_id` the owner holds.
    fn quantity(&self, owner: EntityId, item_id: &str) -> u32;

    /// Remove one unit. Fails without change when the quantity is zero.
    fn consume(&self, owner: EntityId, item_id: &str) -> Result<(), InventoryError>;

    /// Give back one unit taken by [`Inventory::consume`].
    fn restore(&self, owner: EntityId, item_id: &str);
}

/// Inventory kept in process memory, for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryInventory {
    stock: Mutex<HashMap<(EntityId, String), u32>>,
}

impl InMemoryInventory {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the quantity of an item.
    pub fn set_quantity(&self, owner: EntityId, item_id: impl Into<String>, quantity: u32) {
        self.stock.lock().insert((owner, item_id.into()), quantity);
    }
}

impl Inventory for InMemoryInventory {
    fn quantity(&self, owner: EntityId, item_id: &str) -> u32 {
        self.stock
            .lock()
            .get(&(owner, item_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn consume(&self, owner: EntityId, item_id: &str) -> Result<(), InventoryError> {
        let mut stock = self.stock.lock();
        match stock.get_mut(&(owner, item_id.to_string())) {
            Some(quantity) if *quantity > 0 => {
                *quantity -= 1;
                Ok(())
            }
            _ => Err(InventoryError::Depleted {
                owner,
                item_id: item_id.to_string(),
            }),
        }
    }

    fn restore(&self, owner: EntityId, item_id: &str) {
        *self
            .stock
            .lock()
            .entry((owner, item_id.to_string()))
            .or_insert(0) += 1;
    }
}
