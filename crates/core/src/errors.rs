use thiserror::Error;

/// Errors that abort a DataMap execution instead of falling through.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DataMapError {
    #[error("invalid data_map document: {0}")]
    InvalidConfig(String),
    #[error("unsupported HTTP method `{method}` for webhook `{url}`")]
    UnsupportedMethod { method: String, url: String },
}

/// Uniform failure surface for webhook I/O.
///
/// Every variant is recoverable from the interpreter's point of view: the
/// attempt is recorded as a protocol error and the next webhook is tried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl DataMapError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::UnsupportedMethod { .. } => "unsupported_method",
        }
    }
}

impl From<serde_json::Error> for DataMapError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidConfig(value.to_string())
    }
}
