//! Logical service names as announced to the registry.

pub const ORDER_SERVICE: &str = "OrderService";
pub const PAYMENT_SERVICE: &str = "PaymentService";
pub const NOTIFICATION_SERVICE: &str = "NotificationService";

/// External product catalogue; consulted best-effort when orders are created.
pub const PRODUCT_SERVICE: &str = "ProductService";

/// Header carrying the caller identity resolved by the upstream gateway.
pub const USER_ID_HEADER: &str = "x-user-id";
