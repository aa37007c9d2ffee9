use thiserror::Error;

/// Failures of a single peer call.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Discovery found no healthy instance. Raised before any network I/O.
    #[error("Service {0} is unavailable")]
    ServiceUnavailable(String),

    /// Transport failure, timeout, non-2xx answer or an envelope reporting
    /// failure.
    #[error("Call to {service} failed: {message}")]
    RemoteCall {
        service: String,
        status: Option<u16>,
        body: Option<String>,
        message: String,
    },

    /// The peer answered 2xx with something that is not a JSON object.
    #[error("Malformed response from {service}: {message}")]
    DecodeFailure { service: String, message: String },
}

impl RpcError {
    /// HTTP status returned by the peer, if it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            RpcError::RemoteCall { status, .. } => *status,
            _ => None,
        }
    }

    /// True when the peer answered with a 4xx: the request was refused, not
    /// lost.
    pub fn is_rejection(&self) -> bool {
        matches!(self.status(), Some(status) if (400..500).contains(&status))
    }
}

/// Result type for peer calls.
pub type Result<T> = std::result::Result<T, RpcError>;
