//! Error types for flyfeed.

use thiserror::Error;

/// Common error type for flyfeed.
#[derive(Error, Debug)]
pub enum FlyfeedError {
    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network or HTTP-level failure while talking to an upstream source.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Upstream payload could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The fetch deadline elapsed before the operation finished.
    #[error("operation timed out")]
    Timeout,

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for caller input.
    #[error("validation error: {0}")]
    Validation(String),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for FlyfeedError {
    fn from(e: sqlx::Error) -> Self {
        FlyfeedError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for FlyfeedError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FlyfeedError::Timeout
        } else {
            FlyfeedError::Http(e.to_string())
        }
    }
}

/// Result type alias for flyfeed operations.
pub type Result<T> = std::result::Result<T, FlyfeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let err = FlyfeedError::Http("HTTP 503".to_string());
        assert_eq!(err.to_string(), "HTTP error: HTTP 503");
    }

    #[test]
    fn test_parse_error_display() {
        let err = FlyfeedError::Parse("unexpected end of input".to_string());
        assert_eq!(err.to_string(), "parse error: unexpected end of input");
    }

    #[test]
    fn test_timeout_and_cancelled_display() {
        assert_eq!(FlyfeedError::Timeout.to_string(), "operation timed out");
        assert_eq!(FlyfeedError::Cancelled.to_string(), "operation cancelled");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FlyfeedError = io_err.into();
        assert!(matches!(err, FlyfeedError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let json_err = serde_json::from_str::<Vec<String>>("{").unwrap_err();
        let err: FlyfeedError = json_err.into();
        assert!(matches!(err, FlyfeedError::Serialization(_)));
    }

    #[test]
    fn test_result_alias() {
        fn sample_ok() -> Result<i32> {
            Ok(42)
        }

        fn sample_err() -> Result<i32> {
            Err(FlyfeedError::Config("test".to_string()))
        }

        assert_eq!(sample_ok().unwrap(), 42);
        assert!(sample_err().is_err());
    }
}
