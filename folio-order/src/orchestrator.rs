use folio_core::payment::{GatewayError, GatewayRequest, PaymentGateway};
use folio_core::{CoreError, CoreResult};
use folio_shared::{Order, OrderStatus};
use std::sync::Arc;

use crate::breaker::{BreakerError, CircuitBreaker};
use crate::lifecycle::OrderLifecycle;

/// Outcome of a successful payment initiation
#[derive(Debug, Clone)]
pub struct PaymentInitiation {
    pub order: Order,
    pub redirect_url: String,
}

/// Drives the pending → processing hand-off to the payment provider
pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    breaker: Arc<CircuitBreaker>,
    lifecycle: Arc<OrderLifecycle>,
}

impl PaymentOrchestrator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        breaker: Arc<CircuitBreaker>,
        lifecycle: Arc<OrderLifecycle>,
    ) -> Self {
        Self {
            gateway,
            breaker,
            lifecycle,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Create a provider transaction for a pending order and move the order
    /// to processing with the returned redirect URL as its reference.
    pub async fn initiate_payment(&self, order: &Order) -> CoreResult<PaymentInitiation> {
        if order.status != OrderStatus::Pending {
            return Err(CoreError::InvalidState {
                order_id: order.id,
                current: order.status,
                expected: OrderStatus::Pending,
            });
        }

        let request = GatewayRequest::from_order(order);
        tracing::info!(
            order_id = %order.id,
            gross_amount_cents = request.gross_amount_cents,
            breaker = %self.breaker.name(),
            "Initiating payment"
        );

        let response = self
            .breaker
            .call(
                || self.gateway.create_transaction(&request),
                |e| matches!(e, GatewayError::Unavailable(_)),
            )
            .await
            .map_err(|e| match e {
                BreakerError::Open => {
                    CoreError::GatewayUnavailable("payment circuit is open".into())
                }
                BreakerError::TooManyRequests => {
                    CoreError::GatewayUnavailable("payment circuit is busy with trial calls".into())
                }
                BreakerError::Inner(GatewayError::Unavailable(reason)) => {
                    tracing::error!(order_id = %order.id, %reason, "Payment provider unavailable");
                    CoreError::GatewayUnavailable(reason)
                }
                BreakerError::Inner(GatewayError::Rejected(reason)) => {
                    CoreError::GatewayRejected(reason)
                }
            })?;

        let order = self
            .lifecycle
            .mark_processing(order.id, &response.redirect_url)
            .await?;

        Ok(PaymentInitiation {
            order,
            redirect_url: response.redirect_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerSettings;
    use crate::gateway::MockPaymentGateway;
    use folio_core::repository::{OrderRepository, UnitOfWork};
    use folio_shared::{Item, NewOrder, NewOrderLine, OrderId, UserId};
    use folio_store::InMemoryStore;

    struct Fixture {
        store: Arc<InMemoryStore>,
        gateway: Arc<MockPaymentGateway>,
        orchestrator: PaymentOrchestrator,
    }

    fn fixture(gateway: MockPaymentGateway) -> Fixture {
        let store = Arc::new(InMemoryStore::with_items([Item::new(1, "Dune", 2599, 5)]));
        let gateway = Arc::new(gateway);
        let orchestrator = PaymentOrchestrator::new(
            gateway.clone(),
            Arc::new(CircuitBreaker::new("payment-gateway", BreakerSettings::default())),
            Arc::new(OrderLifecycle::new(store.clone())),
        );
        Fixture {
            store,
            gateway,
            orchestrator,
        }
    }

    async fn pending_order(store: &InMemoryStore) -> Order {
        let mut uow = store.begin().await.unwrap();
        let id: OrderId = uow
            .persist_order(&NewOrder {
                buyer_id: UserId(1),
                lines: vec![NewOrderLine {
                    item_id: 1.into(),
                    quantity: 2,
                    unit_price_cents: 2599,
                }],
                total_cents: 5198,
                status: OrderStatus::Pending,
            })
            .await
            .unwrap();
        uow.commit().await.unwrap();
        store.load_order(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_initiate_moves_order_to_processing() {
        let f = fixture(MockPaymentGateway::new());
        let order = pending_order(&f.store).await;

        let initiation = f.orchestrator.initiate_payment(&order).await.unwrap();
        assert_eq!(initiation.order.status, OrderStatus::Processing);
        assert_eq!(
            initiation.order.payment_reference.as_deref(),
            Some(initiation.redirect_url.as_str())
        );
        assert_eq!(f.gateway.requests()[0].gross_amount_cents, 5198);
    }

    #[tokio::test]
    async fn test_non_pending_order_never_reaches_gateway() {
        let f = fixture(MockPaymentGateway::new());
        let mut order = pending_order(&f.store).await;
        order.status = OrderStatus::Shipped;

        let err = f.orchestrator.initiate_payment(&order).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { current: OrderStatus::Shipped, .. }));
        assert_eq!(f.gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_gateway_failures_leave_order_pending() {
        let f = fixture(MockPaymentGateway::with_outcomes([
            Err(GatewayError::Unavailable("connection reset".into())),
            Err(GatewayError::Rejected("merchant disabled".into())),
        ]));
        let order = pending_order(&f.store).await;

        let err = f.orchestrator.initiate_payment(&order).await.unwrap_err();
        assert!(matches!(err, CoreError::GatewayUnavailable(_)));
        let err = f.orchestrator.initiate_payment(&order).await.unwrap_err();
        assert!(matches!(err, CoreError::GatewayRejected(_)));

        let stored = f.store.load_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(stored.payment_reference, None);
        assert_eq!(f.orchestrator.breaker().counts().failures, 1);
    }
}
