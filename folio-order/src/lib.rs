pub mod breaker;
pub mod gateway;
pub mod lifecycle;
pub mod orchestrator;
pub mod service;
pub mod settlement;

pub use breaker::{BreakerError, BreakerSettings, CircuitBreaker, CircuitState};
pub use gateway::{HttpPaymentGateway, MockPaymentGateway};
pub use lifecycle::OrderLifecycle;
pub use orchestrator::{PaymentInitiation, PaymentOrchestrator};
pub use service::OrderService;
pub use settlement::SettlementCoordinator;
