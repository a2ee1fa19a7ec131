use async_trait::async_trait;
use folio_shared::{Item, ItemId, NewOrder, Order, OrderId, OrderStatus, PageRequest, UserId};

/// Storage-layer failure, passed through opaquely by the core
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("row not found: {0}")]
    RowNotFound(String),

    /// A concurrent unit of work changed the row first
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend(message.into().into())
    }
}

/// Read-only catalog lookup
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError>;
}

/// Repository trait for order data access
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Open an atomic unit of work
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    /// Load an order with its lines and the current item detail attached
    async fn load_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Newest first, with the total row count
    async fn list_orders_for_buyer(
        &self,
        buyer_id: UserId,
        page: PageRequest,
    ) -> Result<(Vec<Order>, u64), StoreError>;

    async fn list_orders(&self, page: PageRequest) -> Result<(Vec<Order>, u64), StoreError>;

    /// Returns `false` when no such order exists
    async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<bool, StoreError>;
}

/// An open transaction over orders and stock.
///
/// Writes become visible to other readers only after `commit`. Dropping the
/// unit of work without committing discards every write made through it.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn persist_order(&mut self, order: &NewOrder) -> Result<OrderId, StoreError>;

    /// Current stock as seen by this transaction, including its own writes
    async fn stock_for_update(&mut self, item_id: ItemId) -> Result<Option<i32>, StoreError>;

    async fn decrement_stock(&mut self, item_id: ItemId, new_value: i32) -> Result<(), StoreError>;

    /// Compare-and-set on the status column: writes `to` only if the row is
    /// currently `from`. Returns whether a row was updated.
    async fn transition_status(
        &mut self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StoreError>;

    async fn update_payment_reference(
        &mut self,
        id: OrderId,
        reference: &str,
    ) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
