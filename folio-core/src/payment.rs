use async_trait::async_trait;
use folio_shared::{ItemId, Order, OrderId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayLineItem {
    pub id: ItemId,
    pub name: String,
    pub price_cents: i64,
    pub quantity: i32,
}

/// Transaction creation request sent to the payment provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRequest {
    pub order_id: OrderId,
    pub gross_amount_cents: i64,
    pub items: Vec<GatewayLineItem>,
}

impl GatewayRequest {
    /// The gross amount is always the sum of line subtotals; the stored
    /// order total is never consulted.
    pub fn from_order(order: &Order) -> Self {
        let items = order
            .lines
            .iter()
            .map(|line| GatewayLineItem {
                id: line.item_id,
                name: line
                    .item
                    .as_ref()
                    .map(|item| item.title.clone())
                    .unwrap_or_else(|| format!("item-{}", line.item_id)),
                price_cents: line.unit_price_cents,
                quantity: line.quantity,
            })
            .collect();

        Self {
            order_id: order.id,
            gross_amount_cents: order.lines_total_cents(),
            items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub token: Option<String>,
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Provider answered and declined; retrying the same request won't help
    #[error("rejected: {0}")]
    Rejected(String),

    /// Transport failure, timeout or provider-side fault
    #[error("unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a transaction with the provider and return where to send the buyer
    async fn create_transaction(
        &self,
        request: &GatewayRequest,
    ) -> Result<GatewayResponse, GatewayError>;
}
