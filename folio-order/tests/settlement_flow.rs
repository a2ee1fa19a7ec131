use async_trait::async_trait;
use folio_core::identity::{Role, StaticIdentityResolver};
use folio_core::payment::GatewayError;
use folio_core::repository::{CatalogRepository, OrderRepository, StoreError};
use folio_core::CoreError;
use folio_order::{BreakerSettings, CircuitState, MockPaymentGateway, OrderService};
use folio_shared::{Item, ItemId, LineRequest, OrderId, OrderStatus, PageRequest};
use folio_store::InMemoryStore;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

const BUYER: &str = "buyer-token";
const OTHER_BUYER: &str = "other-buyer-token";
const ADMIN: &str = "admin-token";

fn identity() -> Arc<StaticIdentityResolver> {
    Arc::new(
        StaticIdentityResolver::new()
            .with_token(BUYER, 1, Role::Customer)
            .with_token(OTHER_BUYER, 2, Role::Customer)
            .with_token(ADMIN, 99, Role::Admin),
    )
}

fn service_with(
    store: &Arc<InMemoryStore>,
    catalog: Arc<dyn CatalogRepository>,
    gateway: &Arc<MockPaymentGateway>,
) -> Arc<OrderService> {
    Arc::new(OrderService::assemble(
        identity(),
        catalog,
        store.clone(),
        gateway.clone(),
        BreakerSettings::default(),
        Duration::from_secs(5),
    ))
}

fn service(store: &Arc<InMemoryStore>, gateway: &Arc<MockPaymentGateway>) -> Arc<OrderService> {
    service_with(store, store.clone(), gateway)
}

/// Catalog view that lags behind the store and over-reports stock
struct StaleCatalog {
    store: Arc<InMemoryStore>,
    extra: i32,
}

#[async_trait]
impl CatalogRepository for StaleCatalog {
    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.store.get_item(id).await?.map(|mut item| {
            item.stock += self.extra;
            item
        }))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_unit_goes_to_exactly_one_buyer() {
    let store = Arc::new(InMemoryStore::with_items([Item::new(1, "Last Copy", 1999, 1)]));
    let gateway = Arc::new(MockPaymentGateway::new());
    let service = service(&store, &gateway);

    let attempts = [BUYER, OTHER_BUYER].map(|token| {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .create_order(token, &[LineRequest::new(1, 1)], None)
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = results.into_iter().find_map(Result::err).unwrap();
    assert!(matches!(loser, CoreError::InsufficientStock { available: 0, .. }));
    assert_eq!(store.stock(ItemId(1)).await, Some(0));
    assert_eq!(store.order_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_buyers_never_oversell() {
    let store = Arc::new(InMemoryStore::with_items([
        Item::new(1, "Dune", 2599, 10),
        Item::new(2, "Hyperion", 1800, 4),
    ]));
    let gateway = Arc::new(MockPaymentGateway::new());
    let service = service(&store, &gateway);

    let attempts = (0..30).map(|n| {
        let service = service.clone();
        // Half the requests touch both items, in both orders
        let lines = match n % 3 {
            0 => vec![LineRequest::new(1, 1)],
            1 => vec![LineRequest::new(1, 1), LineRequest::new(2, 1)],
            _ => vec![LineRequest::new(2, 1), LineRequest::new(1, 1)],
        };
        tokio::spawn(async move { service.create_order(BUYER, &lines, None).await })
    });
    let orders: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .filter_map(|joined| joined.unwrap().ok())
        .collect();

    let sold = |item: i64| -> i32 {
        orders
            .iter()
            .flat_map(|order| order.lines.iter())
            .filter(|line| line.item_id == ItemId(item))
            .map(|line| line.quantity)
            .sum()
    };
    let dune_left = store.stock(ItemId(1)).await.unwrap();
    let hyperion_left = store.stock(ItemId(2)).await.unwrap();

    assert!(dune_left >= 0 && hyperion_left >= 0);
    assert_eq!(sold(1) + dune_left, 10);
    assert_eq!(sold(2) + hyperion_left, 4);
    assert_eq!(store.order_count().await, orders.len());
}

#[tokio::test]
async fn test_refused_reservation_rolls_back_every_line() {
    let store = Arc::new(InMemoryStore::with_items([
        Item::new(1, "Dune", 2599, 5),
        Item::new(2, "Hyperion", 1800, 1),
    ]));
    let gateway = Arc::new(MockPaymentGateway::new());
    let stale = Arc::new(StaleCatalog {
        store: store.clone(),
        extra: 10,
    });
    let service = service_with(&store, stale, &gateway);

    let err = service
        .create_order(BUYER, &[LineRequest::new(1, 2), LineRequest::new(2, 3)], None)
        .await
        .unwrap_err();

    match err {
        CoreError::InsufficientStock { item_id, available, requested, .. } => {
            assert_eq!(item_id, ItemId(2));
            assert_eq!((requested, available), (3, 1));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(store.order_count().await, 0);
    assert_eq!(store.stock(ItemId(1)).await, Some(5));
    assert_eq!(store.stock(ItemId(2)).await, Some(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_payment_initiation_succeeds_once() {
    let store = Arc::new(InMemoryStore::with_items([Item::new(1, "Dune", 2599, 5)]));
    let gateway = Arc::new(MockPaymentGateway::new());
    let service = service(&store, &gateway);
    let order = service
        .create_order(BUYER, &[LineRequest::new(1, 1)], None)
        .await
        .unwrap();

    let order_id = order.id;
    let attempts = (0..5).map(|_| {
        let service = service.clone();
        tokio::spawn(async move { service.initiate_payment(BUYER, order_id, None).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    for result in &results {
        if let Err(err) = result {
            assert!(matches!(err, CoreError::InvalidState { .. }), "{err:?}");
        }
    }

    let stored = service.get_order(BUYER, order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Processing);
    assert_eq!(
        stored.payment_reference.as_deref(),
        Some(winners[0].redirect_url.as_str())
    );
}

#[tokio::test]
async fn test_gross_amount_comes_from_lines_not_stored_total() {
    let store = Arc::new(InMemoryStore::with_items([Item::new(1, "Dune", 2599, 5)]));
    let gateway = Arc::new(MockPaymentGateway::new());
    let service = service(&store, &gateway);

    let order = service
        .create_order(BUYER, &[LineRequest::new(1, 2)], None)
        .await
        .unwrap();
    assert_eq!(order.total_cents, 5198);

    store.corrupt_total(order.id, 1).await;
    service.initiate_payment(BUYER, order.id, None).await.unwrap();

    let sent = gateway.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].gross_amount_cents, 5198);
    assert_eq!(sent[0].items[0].name, "Dune");
}

#[tokio::test]
async fn test_line_prices_are_fixed_at_order_time() {
    let store = Arc::new(InMemoryStore::with_items([Item::new(1, "Dune", 2599, 5)]));
    let gateway = Arc::new(MockPaymentGateway::new());
    let service = service(&store, &gateway);

    let order = service
        .create_order(BUYER, &[LineRequest::new(1, 1)], None)
        .await
        .unwrap();
    store.set_price(ItemId(1), 9900).await;

    let stored = service.get_order(BUYER, order.id).await.unwrap();
    assert_eq!(stored.lines[0].unit_price_cents, 2599);
    assert_eq!(stored.total_cents, 2599);
}

#[tokio::test]
async fn test_breaker_opens_after_gateway_outage() {
    let store = Arc::new(InMemoryStore::with_items([Item::new(1, "Dune", 2599, 50)]));
    let gateway = Arc::new(MockPaymentGateway::with_outcomes(
        (0..5).map(|_| Err(GatewayError::Unavailable("upstream 503".into()))),
    ));
    let service = service(&store, &gateway);
    let order = service
        .create_order(BUYER, &[LineRequest::new(1, 1)], None)
        .await
        .unwrap();

    for _ in 0..5 {
        let err = service.initiate_payment(BUYER, order.id, None).await.unwrap_err();
        assert!(matches!(err, CoreError::GatewayUnavailable(_)));
    }
    assert_eq!(service.payments().breaker().state(), CircuitState::Open);

    let err = service.initiate_payment(BUYER, order.id, None).await.unwrap_err();
    assert!(matches!(err, CoreError::GatewayUnavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(gateway.calls(), 5);

    let stored = service.get_order(BUYER, order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_declines_do_not_open_the_breaker() {
    let store = Arc::new(InMemoryStore::with_items([Item::new(1, "Dune", 2599, 50)]));
    let gateway = Arc::new(MockPaymentGateway::with_outcomes(
        (0..6).map(|_| Err(GatewayError::Rejected("invalid merchant".into()))),
    ));
    let service = service(&store, &gateway);
    let order = service
        .create_order(BUYER, &[LineRequest::new(1, 1)], None)
        .await
        .unwrap();

    for _ in 0..6 {
        let err = service.initiate_payment(BUYER, order.id, None).await.unwrap_err();
        assert!(matches!(err, CoreError::GatewayRejected(_)));
    }
    assert_eq!(service.payments().breaker().state(), CircuitState::Closed);
    assert_eq!(gateway.calls(), 6);
}

#[tokio::test]
async fn test_access_rules() {
    let store = Arc::new(InMemoryStore::with_items([Item::new(1, "Dune", 2599, 5)]));
    let gateway = Arc::new(MockPaymentGateway::new());
    let service = service(&store, &gateway);
    let order = service
        .create_order(BUYER, &[LineRequest::new(1, 1)], None)
        .await
        .unwrap();

    let err = service
        .create_order("forged", &[LineRequest::new(1, 1)], None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Unauthorized(_)));

    let err = service.get_order(OTHER_BUYER, order.id).await.unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));
    assert!(service.get_order(ADMIN, order.id).await.is_ok());

    let err = service.initiate_payment(OTHER_BUYER, order.id, None).await.unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));
    assert_eq!(gateway.calls(), 0);

    let err = service
        .update_order_status(BUYER, order.id, "shipped")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    let err = service
        .update_order_status(ADMIN, order.id, "bogus")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidRequest(_)));

    let err = service
        .get_all_orders(BUYER, PageRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    let err = service.get_order(BUYER, OrderId(404)).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { entity: "order", .. }));

    let stored = service.get_order(BUYER, order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_admin_moves_order_through_lifecycle() {
    let store = Arc::new(InMemoryStore::with_items([Item::new(1, "Dune", 2599, 5)]));
    let gateway = Arc::new(MockPaymentGateway::new());
    let service = service(&store, &gateway);
    let order = service
        .create_order(BUYER, &[LineRequest::new(1, 1)], None)
        .await
        .unwrap();

    service.initiate_payment(BUYER, order.id, None).await.unwrap();
    let shipped = service
        .update_order_status(ADMIN, order.id, "shipped")
        .await
        .unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);

    let err = service.initiate_payment(BUYER, order.id, None).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::InvalidState { current: OrderStatus::Shipped, expected: OrderStatus::Pending, .. }
    ));
}

#[tokio::test]
async fn test_listing_is_scoped_and_paged() {
    let store = Arc::new(InMemoryStore::with_items([Item::new(1, "Dune", 2599, 50)]));
    let gateway = Arc::new(MockPaymentGateway::new());
    let service = service(&store, &gateway);

    for _ in 0..3 {
        service.create_order(BUYER, &[LineRequest::new(1, 1)], None).await.unwrap();
    }
    service.create_order(OTHER_BUYER, &[LineRequest::new(1, 1)], None).await.unwrap();

    let mine = service
        .get_orders_for_buyer(BUYER, PageRequest::new(1, 2))
        .await
        .unwrap();
    assert_eq!(mine.total, 3);
    assert_eq!(mine.items.len(), 2);
    assert!(mine.items.iter().all(|order| order.buyer_id.0 == 1));

    let all = service
        .get_all_orders(ADMIN, PageRequest::new(2, 3))
        .await
        .unwrap();
    assert_eq!(all.total, 4);
    assert_eq!(all.items.len(), 1);

    let err = service
        .get_orders_for_buyer(BUYER, PageRequest::new(1, 500))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidRequest(_)));
}
