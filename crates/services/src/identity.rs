//! Caller identity attached by the upstream gateway.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use common::services::USER_ID_HEADER;

use crate::error::ApiError;

/// The authenticated caller, read from the `X-User-Id` header.
///
/// Credentials are verified upstream; this only parses the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for CallerId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("missing caller identity".to_string()))?;
        let caller = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<UserId>().ok())
            .ok_or_else(|| ApiError::Unauthorized("malformed caller identity".to_string()))?;
        Ok(CallerId(caller))
    }
}
