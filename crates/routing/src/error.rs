use thiserror::Error;

/// Crate-wide result type for routing internals.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A back-channel control message was present but its payload could not
    /// be decoded.
    #[error("malformed back-channel payload: {message}")]
    Backchannel { message: String },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn backchannel(message: impl Into<String>) -> Self {
        Self::Backchannel {
            message: message.into(),
        }
    }
}
