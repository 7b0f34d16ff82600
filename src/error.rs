//! Error types and result definitions for the philair crate.
//! Includes numeric error codes and conversion from standard IO/JSON errors.

use thiserror::Error;

/// Reasons a status report could not be decoded into an attribute record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The device produced no output at all
    #[error("empty status response")]
    Empty,

    /// The report ended before the line holding `field`
    #[error("status response truncated: no line {line} for '{field}'")]
    Truncated { field: &'static str, line: usize },

    /// The line holding `field` has no `": "` separator
    #[error("line {line} for '{field}' has no value delimiter")]
    MissingDelimiter { field: &'static str, line: usize },
}

/// Represents all possible errors that can occur when controlling a purifier.
#[derive(Error, Debug, Clone)]
pub enum PurifierError {
    /// The control tool could not be run or returned nothing usable
    #[error("Transport error: {0}")]
    Transport(String),

    /// The status report did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The failure marker persisted past the resend bound
    #[error("Command still failing after {0} resends")]
    RetryExhausted(u32),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A value outside one of the closed option sets
    #[error("Invalid option '{value}' for {field}")]
    InvalidOption { field: &'static str, value: String },

    /// The pub/sub bus refused a message
    #[error("Publish error: {0}")]
    Publish(String),

    /// Standard IO error
    #[error("IO error: {0}")]
    Io(String),

    /// JSON serialization or deserialization error
    #[error("JSON error: {0}")]
    Json(String),

    /// Entity ID already exists in manager
    #[error("Entity '{0}' already exists")]
    DuplicateDevice(String),

    /// Entity ID not found in manager
    #[error("Entity '{0}' not found")]
    DeviceNotFound(String),

    /// Service name not handled by this integration
    #[error("Unknown service '{0}'")]
    UnknownService(String),
}

/// A specialized Result type for purifier operations.
pub type Result<T> = std::result::Result<T, PurifierError>;

impl From<std::io::Error> for PurifierError {
    fn from(err: std::io::Error) -> Self {
        PurifierError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PurifierError {
    fn from(err: serde_json::Error) -> Self {
        PurifierError::Json(err.to_string())
    }
}

impl PurifierError {
    pub fn invalid_option(field: &'static str, value: impl Into<String>) -> Self {
        PurifierError::InvalidOption {
            field,
            value: value.into(),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            PurifierError::Transport(_) => ERR_TRANSPORT,
            PurifierError::Parse(_) => ERR_PARSE,
            PurifierError::RetryExhausted(_) => ERR_RETRY_EXHAUSTED,
            PurifierError::Configuration(_) => ERR_CONFIG,
            PurifierError::InvalidOption { .. } => ERR_RANGE,
            PurifierError::Publish(_) => ERR_PUBLISH,
            PurifierError::Io(_) => ERR_TRANSPORT,
            PurifierError::Json(_) => ERR_JSON,
            PurifierError::DuplicateDevice(_) => ERR_DUPLICATE,
            PurifierError::DeviceNotFound(_) => ERR_NOT_FOUND,
            PurifierError::UnknownService(_) => ERR_SERVICE,
        }
    }
}

define_error_codes! {
    ERR_SUCCESS = 0 => "Command Successful",
    ERR_TRANSPORT = 901 => "Transport Error: Command Execution Failed",
    ERR_PARSE = 902 => "Unexpected Status Response from Device",
    ERR_RETRY_EXHAUSTED = 903 => "Infinite Resend Loop: Command Kept Failing",
    ERR_CONFIG = 904 => "Invalid Configuration",
    ERR_RANGE = 905 => "Specified Value Out of Range",
    ERR_PUBLISH = 906 => "Unable to Publish State",
    ERR_JSON = 907 => "Invalid JSON",
    ERR_DUPLICATE = 908 => "Entity already exists",
    ERR_NOT_FOUND = 909 => "Entity not found",
    ERR_SERVICE = 910 => "Service Not Supported",
}
