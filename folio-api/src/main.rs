use anyhow::Context;
use folio_api::{app, AppState, JwtIdentityResolver};
use folio_core::payment::PaymentGateway;
use folio_core::repository::{CatalogRepository, OrderRepository};
use folio_order::{BreakerSettings, HttpPaymentGateway, MockPaymentGateway, OrderService};
use folio_store::app_config::Config;
use folio_store::{DbClient, InMemoryStore, PgCatalogRepository, PgOrderRepository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "folio_api=debug,folio_order=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Folio API on port {}", config.server.port);

    // Postgres when configured, otherwise an empty in-memory store
    let (catalog, orders): (Arc<dyn CatalogRepository>, Arc<dyn OrderRepository>) =
        match DbClient::from_config(&config.database)
            .await
            .context("Failed to connect to Postgres")?
        {
            Some(db) => {
                db.migrate().await.context("Failed to run migrations")?;
                let catalog: Arc<dyn CatalogRepository> =
                    Arc::new(PgCatalogRepository::new(db.pool.clone()));
                let orders: Arc<dyn OrderRepository> = Arc::new(PgOrderRepository::new(db.pool));
                (catalog, orders)
            }
            None => {
                tracing::warn!("No database.url configured; using the in-memory store");
                let store = Arc::new(InMemoryStore::new());
                let catalog: Arc<dyn CatalogRepository> = store.clone();
                let orders: Arc<dyn OrderRepository> = store;
                (catalog, orders)
            }
        };

    let gateway: Arc<dyn PaymentGateway> = if config.payment.mock {
        tracing::warn!("Payment gateway is mocked");
        Arc::new(MockPaymentGateway::new())
    } else {
        Arc::new(HttpPaymentGateway::new(&config.payment).context("Failed to build payment client")?)
    };

    let service = OrderService::assemble(
        Arc::new(JwtIdentityResolver::from_config(&config.auth)),
        catalog,
        orders,
        gateway,
        BreakerSettings::from(&config.breaker),
        Duration::from_millis(config.settlement.deadline_ms),
    );

    let app = app(AppState::new(service));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
