use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::{ItemId, OrderId, UserId};
use crate::models::Item;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Shipped | OrderStatus::Completed | OrderStatus::Cancelled
        )
    }

    /// Edges of the lifecycle graph: pending -> processing -> {shipped, completed, cancelled}
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Processing)
                | (OrderStatus::Processing, OrderStatus::Shipped)
                | (OrderStatus::Processing, OrderStatus::Completed)
                | (OrderStatus::Processing, OrderStatus::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A persisted order. Created once, then only mutated through lifecycle
/// transitions; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub lines: Vec<OrderLine>,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Sum of line subtotals, recomputed from the lines rather than read
    /// from `total_cents`.
    pub fn lines_total_cents(&self) -> i64 {
        self.lines.iter().map(OrderLine::subtotal_cents).sum()
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.buyer_id == user_id
    }
}

/// One line of a persisted order. The unit price is a copy taken at order
/// time, so later catalog price changes never touch it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: i64,
    pub item_id: ItemId,
    pub quantity: i32,
    pub unit_price_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<Item>,
}

impl OrderLine {
    pub fn subtotal_cents(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }
}

/// A requested line, as submitted by the buyer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub item_id: ItemId,
    pub quantity: i32,
}

impl LineRequest {
    pub fn new(item_id: impl Into<ItemId>, quantity: i32) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
        }
    }
}

/// Order as built by the settlement coordinator, before the store assigns ids
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub buyer_id: UserId,
    pub lines: Vec<NewOrderLine>,
    pub total_cents: i64,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct NewOrderLine {
    pub item_id: ItemId,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_and_rejects_unknown() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        let err = "bogus".parse::<OrderStatus>().unwrap_err();
        assert_eq!(err.to_string(), "invalid status: bogus");
        assert!("Pending".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_transition_graph() {
        use OrderStatus::*;

        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Processing.can_transition_to(Pending));
        for terminal in [Shipped, Completed, Cancelled] {
            assert!(terminal.is_terminal());
            assert!(OrderStatus::ALL.iter().all(|s| !terminal.can_transition_to(*s)));
        }
    }

    #[test]
    fn test_lines_total_ignores_stored_total() {
        let now = Utc::now();
        let order = Order {
            id: OrderId(1),
            buyer_id: UserId(7),
            lines: vec![OrderLine {
                id: 1,
                item_id: ItemId(3),
                quantity: 2,
                unit_price_cents: 2599,
                item: None,
            }],
            total_cents: 1,
            status: OrderStatus::Pending,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        };

        assert_eq!(order.lines_total_cents(), 5198);
        assert!(order.is_owned_by(UserId(7)));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&OrderStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
