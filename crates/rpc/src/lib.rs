//! Calls to peer services resolved through the registry.
//!
//! [`ServiceClient`] turns "call `PaymentService` at `/payment/create`" into a
//! discovery lookup plus one HTTP request with a fixed timeout. There is no
//! retry, caching or circuit breaking here; callers decide what a failure
//! means for them.

pub mod client;
pub mod envelope;
pub mod error;

pub use client::{DEFAULT_RPC_TIMEOUT, JsonMap, ServiceClient};
pub use envelope::{decode_data, unwrap_data};
pub use error::{Result, RpcError};
pub use reqwest::Method;
