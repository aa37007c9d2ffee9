//! HTTP handlers, one module per service plus the operational endpoints
//! every service exposes.

pub mod notifications;
pub mod ops;
pub mod orders;
pub mod payments;

use axum::body::Bytes;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Parses an optional JSON body; an empty body yields the default.
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}

#[cfg(test)]
mod tests {
    use saga::PaymentRequest;

    use super::*;

    #[test]
    fn empty_body_is_default() {
        let parsed: PaymentRequest = optional_json(&Bytes::from_static(b"  ")).unwrap();
        assert!(parsed.payment_method.is_none());
    }

    #[test]
    fn malformed_body_is_bad_request() {
        let err = optional_json::<PaymentRequest>(&Bytes::from_static(b"{oops")).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
