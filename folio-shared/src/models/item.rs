use serde::{Deserialize, Serialize};

use crate::ids::ItemId;

/// Catalog item as seen by the settlement core. Owned by the catalog;
/// the core only reads price and stock and requests decrements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub price_cents: i64,
    pub stock: i32,
}

impl Item {
    pub fn new(id: impl Into<ItemId>, title: impl Into<String>, price_cents: i64, stock: i32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            price_cents,
            stock,
        }
    }
}
