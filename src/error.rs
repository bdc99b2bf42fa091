use thiserror::Error;

/// Result type for amplifier operations
pub type Result<T> = std::result::Result<T, NadError>;

/// Errors that can occur when talking to a NAD amplifier
#[derive(Error, Debug)]
pub enum NadError {
    /// Socket could not be opened or failed mid-exchange
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// Device closed the socket
    #[error("Connection closed")]
    ConnectionClosed,

    /// No reply arrived within the request timeout
    #[error("Request timeout")]
    Timeout,

    /// Reply did not match the expected grammar
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Device rejected the parameter or value
    #[error("Device rejected {parameter}: {value:?}")]
    Rejected {
        /// Wire name of the parameter
        parameter: String,
        /// Value sent with the request, if any
        value: Option<String>,
    },

    /// An id or name could not be mapped
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Bulk status returned an empty table
    #[error("Device returned no status data")]
    NoData,

    /// A required capability key is not in the status table
    #[error("Missing capability key: {0}")]
    MissingKey(String),

    /// Request failed local validation and was not sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Update channel error
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NadError {
    /// Whether the error means the socket can no longer be trusted
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            NadError::Connection(_) | NadError::ConnectionClosed | NadError::Timeout
        )
    }
}
