use folio_catalog::{InventoryLedger, LedgerError, PricedLine, PricingEngine, Reservation};
use folio_core::repository::{CatalogRepository, OrderRepository, StoreError};
use folio_core::{CoreError, CoreResult};
use folio_shared::{Item, ItemId, LineRequest, NewOrder, Order, OrderStatus, UserId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::lifecycle::abandon;

/// Turns a purchase request into a committed order with stock decremented,
/// or into no change at all.
pub struct SettlementCoordinator {
    catalog: Arc<dyn CatalogRepository>,
    orders: Arc<dyn OrderRepository>,
    ledger: Arc<InventoryLedger>,
    default_deadline: Duration,
}

impl SettlementCoordinator {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        orders: Arc<dyn OrderRepository>,
        ledger: Arc<InventoryLedger>,
        default_deadline: Duration,
    ) -> Self {
        Self {
            catalog,
            orders,
            ledger,
            default_deadline,
        }
    }

    /// Settle `lines` for `buyer_id`. If `deadline` (or the configured
    /// default) passes first, every partial write is discarded and
    /// `DeadlineExceeded` is returned.
    pub async fn create_order(
        &self,
        buyer_id: UserId,
        lines: &[LineRequest],
        deadline: Option<Duration>,
    ) -> CoreResult<Order> {
        let deadline = deadline.unwrap_or(self.default_deadline);
        match tokio::time::timeout(deadline, self.settle(buyer_id, lines)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(buyer_id = %buyer_id, ?deadline, "Settlement abandoned at deadline");
                Err(CoreError::DeadlineExceeded(deadline))
            }
        }
    }

    async fn settle(&self, buyer_id: UserId, lines: &[LineRequest]) -> CoreResult<Order> {
        validate(lines)?;

        // 1. Resolve, pre-check and price every line against the catalog
        let mut priced = Vec::with_capacity(lines.len());
        for line in lines {
            let item = self.resolve_item(line.item_id).await?;
            if !InventoryLedger::covers(&item, line.quantity) {
                debug!(item_id = %item.id, stock = item.stock, requested = line.quantity, "Pre-check refused line");
                return Err(insufficient(&item, line.quantity, item.stock));
            }
            let priced_line = PricingEngine::price_line(&item, line.quantity)
                .map_err(|e| CoreError::InvalidRequest(e.to_string()))?;
            priced.push((item, priced_line));
        }

        let priced_lines: Vec<PricedLine> = priced.iter().map(|(_, line)| *line).collect();
        let total_cents = PricingEngine::total(&priced_lines)
            .map_err(|e| CoreError::InvalidRequest(e.to_string()))?;

        let new_order = NewOrder {
            buyer_id,
            lines: priced_lines.into_iter().map(Into::into).collect(),
            total_cents,
            status: OrderStatus::Pending,
        };

        // 2. One unit of work: persist, re-check and decrement, commit.
        // The item sections are taken before the transaction opens and stay
        // held until it has ended. Nothing touches an item row without them.
        let locks = self.ledger.lock(lines.iter().map(|line| line.item_id)).await;
        let held: Vec<ItemId> = locks.items().collect();
        debug!(buyer_id = %buyer_id, items = ?held, "Item sections acquired");

        let mut uow = self
            .orders
            .begin()
            .await
            .map_err(|e| CoreError::persistence("begin settlement", e))?;

        let order_id = match uow.persist_order(&new_order).await {
            Ok(id) => id,
            Err(e) => {
                abandon(uow).await;
                return Err(CoreError::persistence("persist order", e));
            }
        };

        for (item, line) in &priced {
            let outcome = self
                .ledger
                .reserve(uow.as_mut(), &locks, line.item_id, line.quantity)
                .await;
            match outcome {
                Ok(Reservation::Granted { remaining, .. }) => {
                    debug!(order_id = %order_id, item_id = %item.id, remaining, "Line reserved");
                }
                Ok(Reservation::Refused { available }) => {
                    abandon(uow).await;
                    info!(
                        order_id = %order_id,
                        item_id = %item.id,
                        available,
                        requested = line.quantity,
                        "Settlement rolled back: stock taken concurrently"
                    );
                    return Err(insufficient(item, line.quantity, available));
                }
                Err(e) => {
                    abandon(uow).await;
                    return Err(ledger_error(e));
                }
            }
        }

        uow.commit()
            .await
            .map_err(|e| CoreError::persistence("commit settlement", e))?;
        drop(locks);

        info!(order_id = %order_id, buyer_id = %buyer_id, total_cents, lines = lines.len(), "Order settled");

        self.orders
            .load_order(order_id)
            .await
            .map_err(|e| CoreError::persistence("load settled order", e))?
            .ok_or_else(|| CoreError::not_found("order", order_id))
    }

    async fn resolve_item(&self, item_id: ItemId) -> CoreResult<Item> {
        self.catalog
            .get_item(item_id)
            .await
            .map_err(|e| CoreError::persistence("load item", e))?
            .ok_or_else(|| CoreError::not_found("item", item_id))
    }
}

fn validate(lines: &[LineRequest]) -> CoreResult<()> {
    if lines.is_empty() {
        return Err(CoreError::InvalidRequest("order must contain at least one line".into()));
    }
    if let Some(line) = lines.iter().find(|line| line.quantity <= 0) {
        return Err(CoreError::InvalidRequest(format!(
            "quantity for item {} must be positive, got {}",
            line.item_id, line.quantity
        )));
    }
    Ok(())
}

fn insufficient(item: &Item, requested: i32, available: i32) -> CoreError {
    CoreError::InsufficientStock {
        item_id: item.id,
        title: item.title.clone(),
        requested,
        available,
    }
}

fn ledger_error(e: LedgerError) -> CoreError {
    match e {
        LedgerError::UnknownItem(id) => CoreError::not_found("item", id),
        LedgerError::Store(source) => CoreError::persistence("reserve stock", source),
        other => CoreError::persistence("reserve stock", StoreError::backend(other.to_string())),
    }
}
