//! Types shared by every service in the workspace.

pub mod envelope;
pub mod services;
pub mod types;

pub use envelope::Envelope;
pub use types::{OrderUuid, PaymentUuid, ProductUuid, UserId};
