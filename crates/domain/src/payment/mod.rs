//! Payments and their lifecycle.

mod method;
mod model;
mod status;

pub use method::PaymentMethod;
pub use model::{Payment, PaymentDraft};
pub use status::PaymentStatus;
