pub mod identity;
pub mod payment;
pub mod repository;

use std::time::Duration;

use folio_shared::{ItemId, OrderId, OrderStatus};

pub use repository::StoreError;

/// Every failure the settlement core can surface to a caller
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Insufficient stock for {title} (item {item_id}): requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        title: String,
        requested: i32,
        available: i32,
    },

    #[error("Order {order_id} is {current}, expected {expected}")]
    InvalidState {
        order_id: OrderId,
        current: OrderStatus,
        expected: OrderStatus,
    },

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Payment gateway rejected the transaction: {0}")]
    GatewayRejected(String),

    #[error("Deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("Persistence failure during {operation}: {source}")]
    PersistenceFailure {
        operation: String,
        #[source]
        source: StoreError,
    },
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn persistence(operation: impl Into<String>, source: StoreError) -> Self {
        CoreError::PersistenceFailure {
            operation: operation.into(),
            source,
        }
    }

    /// Stable, machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::InvalidRequest(_) => "invalid_request",
            CoreError::Unauthorized(_) => "unauthorized",
            CoreError::Forbidden(_) => "forbidden",
            CoreError::NotFound { .. } => "not_found",
            CoreError::InsufficientStock { .. } => "insufficient_stock",
            CoreError::InvalidState { .. } => "invalid_state",
            CoreError::GatewayUnavailable(_) => "gateway_unavailable",
            CoreError::GatewayRejected(_) => "gateway_rejected",
            CoreError::DeadlineExceeded(_) => "deadline_exceeded",
            CoreError::PersistenceFailure { .. } => "persistence_failure",
        }
    }

    /// Whether the same request may succeed later without being changed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::GatewayUnavailable(_) | CoreError::DeadlineExceeded(_)
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
