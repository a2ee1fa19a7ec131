pub mod ids;
pub mod masked;
pub mod models;
pub mod pagination;

pub use ids::{ItemId, OrderId, UserId};
pub use masked::Masked;
pub use models::{Item, LineRequest, NewOrder, NewOrderLine, Order, OrderLine, OrderStatus, UnknownStatus};
pub use pagination::{Page, PageMeta, PageRequest};
