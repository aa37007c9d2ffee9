//! Domain records for the order, payment and notification services.
//!
//! Each record carries its own status state machine; transitions are guarded
//! methods that refuse to move a record out of a state the lifecycle does not
//! allow. Persisting the result is left to the caller, which writes it back
//! with the version it read.

pub mod error;
pub mod money;
pub mod notification;
pub mod order;
pub mod payment;
mod wire;

pub use error::DomainError;
pub use money::Money;
pub use notification::{Notification, NotificationDraft, NotificationType};
pub use order::{
    FALLBACK_PRODUCT_NAME, Order, OrderDraft, OrderItem, OrderLine, OrderSort, OrderStats,
    OrderStatus, ProductSnapshot, ShippingInfo,
};
pub use payment::{Payment, PaymentDraft, PaymentMethod, PaymentStatus};
