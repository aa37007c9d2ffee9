//! Orders and their lifecycle.

mod model;
mod status;

pub use model::{
    FALLBACK_PRODUCT_NAME, Order, OrderDraft, OrderItem, OrderLine, OrderSort, OrderStats,
    ProductSnapshot, ShippingInfo, validate_lines,
};
pub use status::OrderStatus;
