use thiserror::Error;

/// Errors talking to the service directory.
///
/// None of these are fatal to the owning process: registration failures leave
/// the service running but undiscoverable, discovery failures surface as an
/// empty instance list.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The directory could not be reached.
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    /// The directory answered but refused the request.
    #[error("Directory rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The directory answer could not be understood.
    #[error("Malformed directory response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RegistryError::Decode(err.to_string())
        } else {
            RegistryError::Unavailable(err.to_string())
        }
    }
}

/// Result type for directory operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
