//! Strongly typed error system for the qline pipeline.
//!
//! Every failure surfaced by a timeline, a behavior or the batch engine is an
//! [`SdkError`] tagged with an [`ErrorCode`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Typed error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // Network errors
    NetworkError,
    Timeout,
    ConnectionRefused,

    // Protocol errors
    HttpError,
    InvalidUrl,
    InvalidRequest,
    InvalidResponse,

    // Payload errors
    ParseError,
    SerializeError,
    DeserializeError,

    // Auth errors
    AuthError,

    // Programmer errors
    Configuration,
    AlreadyRegistered,

    // Batch errors
    BatchError,

    // Internal errors
    Cancelled,
    InternalError,

    // Custom error (escape hatch, but tracked)
    Custom,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkError => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::ConnectionRefused => "CONNECTION_REFUSED",
            Self::HttpError => "HTTP_ERROR",
            Self::InvalidUrl => "INVALID_URL",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::ParseError => "PARSE_ERROR",
            Self::SerializeError => "SERIALIZE_ERROR",
            Self::DeserializeError => "DESERIALIZE_ERROR",
            Self::AuthError => "AUTH_ERROR",
            Self::Configuration => "CONFIGURATION",
            Self::AlreadyRegistered => "ALREADY_REGISTERED",
            Self::BatchError => "BATCH_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Custom => "CUSTOM",
        }
    }

    /// Returns true if a retry of the same request may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::Timeout | Self::ConnectionRefused
        )
    }

    /// Returns true if this is a client error (4xx equivalent).
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl
                | Self::InvalidRequest
                | Self::ParseError
                | Self::SerializeError
                | Self::AuthError
                | Self::Configuration
                | Self::AlreadyRegistered
        )
    }

    /// Returns true if this is a server error (5xx equivalent).
    pub const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidResponse | Self::BatchError | Self::InternalError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of a failed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpErrorDetails {
    pub status: u16,
    pub status_text: String,
    /// Response body decoded as text (lossy).
    pub body: String,
}

/// Strongly typed SDK error.
#[derive(Error, Debug, Clone)]
#[error("[{code}] {message}")]
pub struct SdkError {
    /// Typed error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Underlying cause.
    #[source]
    pub source: Option<Box<SdkError>>,
    /// Extension data for debugging.
    pub extensions: Option<HashMap<String, serde_json::Value>>,
    /// Present when the error was raised from a non-success HTTP response.
    pub http: Option<HttpErrorDetails>,
}

impl SdkError {
    /// Creates a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            extensions: None,
            http: None,
        }
    }

    /// Adds a source error.
    pub fn with_source(mut self, source: SdkError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Adds extension data.
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let extensions = self.extensions.get_or_insert_with(HashMap::new);
        if let Ok(v) = serde_json::to_value(value) {
            extensions.insert(key.into(), v);
        }
        self
    }

    // Convenience constructors

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, message)
    }

    /// Creates a timeout error.
    pub fn timeout() -> Self {
        Self::new(ErrorCode::Timeout, "Request timed out")
    }

    /// Creates the error raised for a non-success HTTP response.
    pub fn http(status: u16, status_text: impl Into<String>, body: impl Into<String>) -> Self {
        let details = HttpErrorDetails {
            status,
            status_text: status_text.into(),
            body: body.into(),
        };
        let mut err = Self::new(
            ErrorCode::HttpError,
            format!(
                "Error making HttpClient request in queryable [{}] {} ::> {}",
                details.status, details.status_text, details.body
            ),
        );
        err.http = Some(details);
        err
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    /// Creates an auth error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthError, message)
    }

    /// Creates a configuration (programmer) error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Configuration, message)
    }

    /// Creates a serialization error.
    pub fn serialize(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializeError, message)
    }

    /// Creates a deserialization error.
    pub fn deserialize(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeserializeError, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// HTTP status of the failed response, if any.
    pub fn status(&self) -> Option<u16> {
        self.http.as_ref().map(|h| h.status)
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Returns true if this is a client error.
    pub fn is_client_error(&self) -> bool {
        self.code.is_client_error()
    }

    /// Returns true if this is a server error.
    pub fn is_server_error(&self) -> bool {
        self.code.is_server_error()
    }
}

impl Serialize for SdkError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("SdkError", 4)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;
        if let Some(ref http) = self.http {
            state.serialize_field("http", http)?;
        }
        if let Some(ref ext) = self.extensions {
            state.serialize_field("extensions", ext)?;
        }
        state.end()
    }
}

/// Type alias for SDK results.
pub type SdkResult<T> = std::result::Result<T, SdkError>;

/// Extension trait for converting other errors to SdkError.
pub trait IntoSdkError {
    fn into_sdk_error(self, code: ErrorCode) -> SdkError;
}

impl<E: std::error::Error> IntoSdkError for E {
    fn into_sdk_error(self, code: ErrorCode) -> SdkError {
        SdkError::new(code, self.to_string())
    }
}

/// Result extension for mapping errors with context.
pub trait ResultExt<T> {
    /// Maps the error to an SdkError with the given code.
    fn map_sdk_err(self, code: ErrorCode) -> SdkResult<T>;

    /// Maps the error to an SdkError with the given code and message.
    fn map_sdk_err_with(self, code: ErrorCode, message: impl Into<String>) -> SdkResult<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn map_sdk_err(self, code: ErrorCode) -> SdkResult<T> {
        self.map_err(|e| e.into_sdk_error(code))
    }

    fn map_sdk_err_with(self, code: ErrorCode, message: impl Into<String>) -> SdkResult<T> {
        self.map_err(|e| {
            SdkError::new(code, message).with_extension("original_error", e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_properties() {
        assert!(ErrorCode::Timeout.is_retryable());
        assert!(!ErrorCode::HttpError.is_retryable());

        assert!(ErrorCode::Configuration.is_client_error());
        assert!(!ErrorCode::InternalError.is_client_error());

        assert!(ErrorCode::BatchError.is_server_error());
        assert!(!ErrorCode::AlreadyRegistered.is_server_error());
    }

    #[test]
    fn test_http_error_carries_snapshot() {
        let err = SdkError::http(404, "Not Found", "{\"error\":\"missing\"}");

        assert_eq!(err.code, ErrorCode::HttpError);
        assert_eq!(err.status(), Some(404));
        assert!(err.message.contains("[404] Not Found"));
        assert_eq!(err.http.unwrap().body, "{\"error\":\"missing\"}");
    }

    #[test]
    fn test_error_display() {
        let err = SdkError::configuration("no observers registered");
        assert_eq!(err.to_string(), "[CONFIGURATION] no observers registered");
    }

    #[test]
    fn test_error_serialization() {
        let err = SdkError::http(503, "Service Unavailable", "busy");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "HTTP_ERROR");
        assert_eq!(json["http"]["statusText"], "Service Unavailable");
    }

    #[test]
    fn test_result_ext() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));

        let sdk_result = result.map_sdk_err_with(ErrorCode::InternalError, "lookup failed");
        let err = sdk_result.unwrap_err();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(err.extensions.unwrap().contains_key("original_error"));
    }
}
