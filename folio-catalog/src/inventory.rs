use dashmap::DashMap;
use folio_core::repository::{CatalogRepository, StoreError, UnitOfWork};
use folio_shared::{Item, ItemId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Outcome of an authoritative check-and-decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Granted { previous: i32, remaining: i32 },
    Refused { available: i32 },
}

/// Exclusive sections held for a set of items. Dropping it releases them.
#[derive(Debug)]
pub struct StockLocks {
    guards: BTreeMap<ItemId, OwnedMutexGuard<()>>,
}

impl StockLocks {
    pub fn holds(&self, item_id: ItemId) -> bool {
        self.guards.contains_key(&item_id)
    }

    /// Ids held, ascending
    pub fn items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.guards.keys().copied()
    }
}

/// Per-item stock guard.
///
/// Stock values live in the store; the ledger owns the per-item exclusive
/// sections that serialize decrements of the same item while leaving
/// unrelated items free to proceed.
pub struct InventoryLedger {
    catalog: Arc<dyn CatalogRepository>,
    /// One section per item id ever locked. Entries are never evicted, so
    /// the map grows at most to the number of distinct catalog items.
    sections: DashMap<ItemId, Arc<Mutex<()>>>,
}

impl InventoryLedger {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self {
            catalog,
            sections: DashMap::new(),
        }
    }

    /// Advisory availability check against committed stock. Holds no lock,
    /// so a `true` here can still be refused by `reserve`.
    pub async fn has_stock(&self, item_id: ItemId, quantity: i32) -> Result<bool, LedgerError> {
        let item = self
            .catalog
            .get_item(item_id)
            .await?
            .ok_or(LedgerError::UnknownItem(item_id))?;
        Ok(Self::covers(&item, quantity))
    }

    /// Same check for an item the caller already resolved
    pub fn covers(item: &Item, quantity: i32) -> bool {
        item.stock >= quantity
    }

    /// Acquire the exclusive sections of every distinct item, in ascending
    /// id order so that multi-item settlements cannot deadlock each other.
    pub async fn lock(&self, items: impl IntoIterator<Item = ItemId>) -> StockLocks {
        let ids: BTreeSet<ItemId> = items.into_iter().collect();
        let mut guards = BTreeMap::new();

        for id in ids {
            let section = self.sections.entry(id).or_default().value().clone();
            guards.insert(id, section.lock_owned().await);
        }

        StockLocks { guards }
    }

    /// Read the stock through the open unit of work and, if it covers
    /// `quantity`, write the decremented value in that same unit of work.
    ///
    /// The caller must keep `locks` alive until the unit of work commits or
    /// rolls back.
    pub async fn reserve(
        &self,
        uow: &mut dyn UnitOfWork,
        locks: &StockLocks,
        item_id: ItemId,
        quantity: i32,
    ) -> Result<Reservation, LedgerError> {
        if !locks.holds(item_id) {
            return Err(LedgerError::NotLocked(item_id));
        }
        if quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }

        let current = uow
            .stock_for_update(item_id)
            .await?
            .ok_or(LedgerError::UnknownItem(item_id))?;

        if current < quantity {
            tracing::debug!(item_id = %item_id, available = current, requested = quantity, "Reservation refused");
            return Ok(Reservation::Refused { available: current });
        }

        let remaining = current - quantity;
        uow.decrement_stock(item_id, remaining).await?;
        tracing::debug!(item_id = %item_id, previous = current, remaining, "Stock decremented");

        Ok(Reservation::Granted {
            previous: current,
            remaining,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Item not found: {0}")]
    UnknownItem(ItemId),

    #[error("Stock section for item {0} is not held")]
    NotLocked(ItemId),

    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i32),

    #[error(transparent)]
    Store(#[from] StoreError),
}
