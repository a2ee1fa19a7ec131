use folio_core::repository::{OrderRepository, StoreError, UnitOfWork};
use folio_core::{CoreError, CoreResult};
use folio_shared::{Order, OrderId, OrderStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Order status changes after settlement
pub struct OrderLifecycle {
    orders: Arc<dyn OrderRepository>,
}

impl OrderLifecycle {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }

    pub async fn load(&self, order_id: OrderId) -> CoreResult<Order> {
        self.orders
            .load_order(order_id)
            .await
            .map_err(|e| CoreError::persistence("load order", e))?
            .ok_or_else(|| CoreError::not_found("order", order_id))
    }

    /// Transition: Pending → Processing, recording the gateway reference in
    /// the same unit of work. Exactly one of any number of concurrent
    /// callers succeeds; the others get `InvalidState`.
    pub async fn mark_processing(&self, order_id: OrderId, reference: &str) -> CoreResult<Order> {
        let mut uow = self
            .orders
            .begin()
            .await
            .map_err(|e| CoreError::persistence("begin payment update", e))?;

        let moved = uow
            .transition_status(order_id, OrderStatus::Pending, OrderStatus::Processing)
            .await
            .map_err(|e| CoreError::persistence("transition order status", e))?;
        if !moved {
            abandon(uow).await;
            return Err(self.not_pending(order_id).await);
        }

        let attached = uow
            .update_payment_reference(order_id, reference)
            .await
            .map_err(|e| CoreError::persistence("record payment reference", e))?;
        if !attached {
            abandon(uow).await;
            return Err(CoreError::not_found("order", order_id));
        }

        match uow.commit().await {
            Ok(()) => {}
            Err(StoreError::Conflict(reason)) => {
                debug!(order_id = %order_id, %reason, "Lost race to move order to processing");
                return Err(self.not_pending(order_id).await);
            }
            Err(e) => return Err(CoreError::persistence("commit payment update", e)),
        }

        info!(order_id = %order_id, "Order moved to processing");
        self.load(order_id).await
    }

    /// Administrative override. Any status may be set; jumps outside the
    /// normal transition graph are allowed but logged.
    pub async fn set_status(&self, order_id: OrderId, status: OrderStatus) -> CoreResult<Order> {
        let current = self.load(order_id).await?.status;
        if current != status && !current.can_transition_to(status) {
            warn!(
                order_id = %order_id,
                from = %current,
                to = %status,
                reopened = current.is_terminal(),
                "Administrative status change outside the normal lifecycle"
            );
        }

        let updated = self
            .orders
            .update_status(order_id, status)
            .await
            .map_err(|e| CoreError::persistence("update order status", e))?;
        if !updated {
            return Err(CoreError::not_found("order", order_id));
        }

        info!(order_id = %order_id, from = %current, to = %status, "Order status updated");
        self.load(order_id).await
    }

    async fn not_pending(&self, order_id: OrderId) -> CoreError {
        match self.load(order_id).await {
            Ok(order) => CoreError::InvalidState {
                order_id,
                current: order.status,
                expected: OrderStatus::Pending,
            },
            Err(e) => e,
        }
    }
}

/// Parse a caller-supplied status name
pub fn parse_status(raw: &str) -> CoreResult<OrderStatus> {
    raw.parse()
        .map_err(|e: folio_shared::UnknownStatus| CoreError::InvalidRequest(e.to_string()))
}

/// Roll back a unit of work that will not be committed
pub(crate) async fn abandon(uow: Box<dyn UnitOfWork>) {
    if let Err(e) = uow.rollback().await {
        warn!(error = %e, "Rollback failed; the store discards the unit of work on release");
    }
}
