pub mod inventory;
pub mod pricing;

pub use inventory::{InventoryLedger, LedgerError, Reservation, StockLocks};
pub use pricing::{PricedLine, PricingEngine, PricingError};
