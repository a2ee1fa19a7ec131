use folio_order::OrderService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
}

impl AppState {
    pub fn new(orders: OrderService) -> Self {
        Self {
            orders: Arc::new(orders),
        }
    }
}
