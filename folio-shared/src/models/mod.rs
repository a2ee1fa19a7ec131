pub mod item;
pub mod order;

pub use item::Item;
pub use order::{LineRequest, NewOrder, NewOrderLine, Order, OrderLine, OrderStatus, UnknownStatus};
