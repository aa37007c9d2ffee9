//! Tolerant decoding of peer response envelopes.
//!
//! Peers answer either `{"success": bool, "data": .., "error": ..}` or
//! `{"code": int, "message": .., "data": ..}`. A map carrying neither marker
//! is taken to be the payload itself.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::JsonMap;
use crate::error::{Result, RpcError};

/// Extracts the payload of a decoded response, failing if the envelope
/// reports an error.
pub fn unwrap_data(service: &str, mut response: JsonMap) -> Result<Value> {
    if let Some(success) = response.get("success").and_then(Value::as_bool) {
        if success {
            return Ok(response.remove("data").unwrap_or(Value::Null));
        }
        let message = response
            .get("error")
            .or_else(|| response.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("peer reported failure")
            .to_string();
        return Err(rejected(service, None, &response, message));
    }

    if let Some(code) = response.get("code").and_then(Value::as_i64) {
        if code == 0 || (200..300).contains(&code) {
            return Ok(response.remove("data").unwrap_or(Value::Null));
        }
        let message = response
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("peer reported failure")
            .to_string();
        let status = u16::try_from(code).ok().filter(|c| (100..600).contains(c));
        return Err(rejected(service, status, &response, message));
    }

    Ok(Value::Object(response))
}

/// Like [`unwrap_data`], then deserializes the payload.
pub fn decode_data<T: DeserializeOwned>(service: &str, response: JsonMap) -> Result<T> {
    let data = unwrap_data(service, response)?;
    serde_json::from_value(data).map_err(|e| RpcError::DecodeFailure {
        service: service.to_string(),
        message: e.to_string(),
    })
}

fn rejected(service: &str, status: Option<u16>, response: &JsonMap, message: String) -> RpcError {
    RpcError::RemoteCall {
        service: service.to_string(),
        status,
        body: serde_json::to_string(response).ok(),
        message,
    }
}
