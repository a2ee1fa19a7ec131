use folio_shared::{Item, ItemId, NewOrderLine};
use serde::{Deserialize, Serialize};

/// A requested line priced against the catalog at order time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub item_id: ItemId,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
}

impl From<PricedLine> for NewOrderLine {
    fn from(line: PricedLine) -> Self {
        NewOrderLine {
            item_id: line.item_id,
            quantity: line.quantity,
            unit_price_cents: line.unit_price_cents,
        }
    }
}

/// Integer minor-unit pricing. All arithmetic is checked.
pub struct PricingEngine;

impl PricingEngine {
    /// Copy the item's current price into a line and compute its subtotal
    pub fn price_line(item: &Item, quantity: i32) -> Result<PricedLine, PricingError> {
        if item.price_cents < 0 {
            return Err(PricingError::NegativePrice(item.id));
        }

        let subtotal_cents = item
            .price_cents
            .checked_mul(i64::from(quantity))
            .ok_or(PricingError::Overflow(item.id))?;

        Ok(PricedLine {
            item_id: item.id,
            quantity,
            unit_price_cents: item.price_cents,
            subtotal_cents,
        })
    }

    pub fn total(lines: &[PricedLine]) -> Result<i64, PricingError> {
        lines.iter().try_fold(0i64, |acc, line| {
            acc.checked_add(line.subtotal_cents)
                .ok_or(PricingError::Overflow(line.item_id))
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("price overflow on item {0}")]
    Overflow(ItemId),

    #[error("item {0} has a negative price")]
    NegativePrice(ItemId),
}
