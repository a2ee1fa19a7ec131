use folio_catalog::InventoryLedger;
use folio_core::identity::IdentityResolver;
use folio_core::payment::PaymentGateway;
use folio_core::repository::{CatalogRepository, OrderRepository};
use folio_core::{CoreError, CoreResult};
use folio_shared::{LineRequest, Order, OrderId, Page, PageRequest};
use std::sync::Arc;
use std::time::Duration;

use crate::breaker::{BreakerSettings, CircuitBreaker};
use crate::lifecycle::{parse_status, OrderLifecycle};
use crate::orchestrator::{PaymentInitiation, PaymentOrchestrator};
use crate::settlement::SettlementCoordinator;

/// Caller-facing order operations. Every call starts by resolving the
/// bearer token; nothing is read or written for an unauthenticated caller.
pub struct OrderService {
    identity: Arc<dyn IdentityResolver>,
    orders: Arc<dyn OrderRepository>,
    coordinator: SettlementCoordinator,
    lifecycle: Arc<OrderLifecycle>,
    payments: PaymentOrchestrator,
}

impl OrderService {
    pub fn new(
        identity: Arc<dyn IdentityResolver>,
        orders: Arc<dyn OrderRepository>,
        coordinator: SettlementCoordinator,
        lifecycle: Arc<OrderLifecycle>,
        payments: PaymentOrchestrator,
    ) -> Self {
        Self {
            identity,
            orders,
            coordinator,
            lifecycle,
            payments,
        }
    }

    /// Wire the full settlement stack over one catalog and one order store
    pub fn assemble(
        identity: Arc<dyn IdentityResolver>,
        catalog: Arc<dyn CatalogRepository>,
        orders: Arc<dyn OrderRepository>,
        gateway: Arc<dyn PaymentGateway>,
        breaker: BreakerSettings,
        settlement_deadline: Duration,
    ) -> Self {
        let ledger = Arc::new(InventoryLedger::new(catalog.clone()));
        let lifecycle = Arc::new(OrderLifecycle::new(orders.clone()));
        let coordinator =
            SettlementCoordinator::new(catalog, orders.clone(), ledger, settlement_deadline);
        let payments = PaymentOrchestrator::new(
            gateway,
            Arc::new(CircuitBreaker::new("payment-gateway", breaker)),
            lifecycle.clone(),
        );
        Self::new(identity, orders, coordinator, lifecycle, payments)
    }

    pub fn payments(&self) -> &PaymentOrchestrator {
        &self.payments
    }

    pub async fn create_order(
        &self,
        token: &str,
        lines: &[LineRequest],
        deadline: Option<Duration>,
    ) -> CoreResult<Order> {
        let buyer_id = self.identity.resolve_buyer(token).await?;
        self.coordinator.create_order(buyer_id, lines, deadline).await
    }

    /// Visible to the buyer who placed it and to admins
    pub async fn get_order(&self, token: &str, order_id: OrderId) -> CoreResult<Order> {
        let caller = self.identity.resolve(token).await?;
        let order = self.lifecycle.load(order_id).await?;
        if !caller.is_admin() && !order.is_owned_by(caller.user_id) {
            return Err(CoreError::Forbidden(format!(
                "order {} belongs to another buyer",
                order_id
            )));
        }
        Ok(order)
    }

    pub async fn get_orders_for_buyer(
        &self,
        token: &str,
        page: PageRequest,
    ) -> CoreResult<Page<Order>> {
        let buyer_id = self.identity.resolve_buyer(token).await?;
        let page = page.normalize().map_err(CoreError::InvalidRequest)?;
        let (orders, total) = self
            .orders
            .list_orders_for_buyer(buyer_id, page)
            .await
            .map_err(|e| CoreError::persistence("list buyer orders", e))?;
        Ok(Page::new(orders, total, page))
    }

    pub async fn get_all_orders(&self, token: &str, page: PageRequest) -> CoreResult<Page<Order>> {
        self.identity.resolve_admin(token).await?;
        let page = page.normalize().map_err(CoreError::InvalidRequest)?;
        let (orders, total) = self
            .orders
            .list_orders(page)
            .await
            .map_err(|e| CoreError::persistence("list orders", e))?;
        Ok(Page::new(orders, total, page))
    }

    pub async fn update_order_status(
        &self,
        token: &str,
        order_id: OrderId,
        status: &str,
    ) -> CoreResult<Order> {
        let admin_id = self.identity.resolve_admin(token).await?;
        let status = parse_status(status)?;
        tracing::debug!(admin_id = %admin_id, order_id = %order_id, %status, "Admin status update");
        self.lifecycle.set_status(order_id, status).await
    }

    /// Only the buyer who placed the order may pay for it
    pub async fn initiate_payment(
        &self,
        token: &str,
        order_id: OrderId,
        deadline: Option<Duration>,
    ) -> CoreResult<PaymentInitiation> {
        let buyer_id = self.identity.resolve_buyer(token).await?;
        let order = self.lifecycle.load(order_id).await?;
        if !order.is_owned_by(buyer_id) {
            return Err(CoreError::Forbidden(format!(
                "order {} belongs to another buyer",
                order_id
            )));
        }

        match deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.payments.initiate_payment(&order))
                .await
                .map_err(|_| CoreError::DeadlineExceeded(deadline))?,
            None => self.payments.initiate_payment(&order).await,
        }
    }
}
