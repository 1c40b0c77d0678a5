//! Unified error taxonomy shared by every relay crate.
//!
//! Each subsystem crate keeps its own `thiserror` enum for the errors it can
//! actually produce, then converts into [`RelayError`] at the boundary where
//! the error crosses into logging, metrics, or the daemon's top level.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Broad grouping of [`ErrorCode`] variants, mirroring the table in the
/// error-handling design: validation/parse/correlate/queue/publish/config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Parse,
    Correlate,
    Queue,
    Publish,
    Config,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Parse => "parse",
            ErrorCategory::Correlate => "correlate",
            ErrorCategory::Queue => "queue",
            ErrorCategory::Publish => "publish",
            ErrorCategory::Config => "config",
            ErrorCategory::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Stable, machine-readable error code. One variant per row of the error
/// handling design's kind table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PacketTooShort,
    LengthMismatch,
    UnknownPacketType,
    DecodeFailure,
    CorrelatorMiss,
    QueueEmpty,
    QueueIoFailure,
    PublishFailure,
    CredentialExpired,
    ConfigFatal,
}

impl ErrorCode {
    /// The category this code belongs to.
    #[must_use]
    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorCode::PacketTooShort | ErrorCode::LengthMismatch => ErrorCategory::Validation,
            ErrorCode::UnknownPacketType | ErrorCode::DecodeFailure => ErrorCategory::Parse,
            ErrorCode::CorrelatorMiss => ErrorCategory::Correlate,
            ErrorCode::QueueEmpty | ErrorCode::QueueIoFailure => ErrorCategory::Queue,
            ErrorCode::PublishFailure | ErrorCode::CredentialExpired => ErrorCategory::Publish,
            ErrorCode::ConfigFatal => ErrorCategory::Config,
        }
    }

    /// The wire representation, e.g. `"PACKET_TOO_SHORT"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::PacketTooShort => "PACKET_TOO_SHORT",
            ErrorCode::LengthMismatch => "LENGTH_MISMATCH",
            ErrorCode::UnknownPacketType => "UNKNOWN_PACKET_TYPE",
            ErrorCode::DecodeFailure => "DECODE_FAILURE",
            ErrorCode::CorrelatorMiss => "CORRELATOR_MISS",
            ErrorCode::QueueEmpty => "QUEUE_EMPTY",
            ErrorCode::QueueIoFailure => "QUEUE_IO_FAILURE",
            ErrorCode::PublishFailure => "PUBLISH_FAILURE",
            ErrorCode::CredentialExpired => "CREDENTIAL_EXPIRED",
            ErrorCode::ConfigFatal => "CONFIG_FATAL",
        }
    }

    /// Whether this error terminates the process (recovery principle:
    /// only configuration and unrecoverable I/O errors do).
    #[must_use]
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorCode::ConfigFatal)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured, contextual relay error.
pub struct RelayError {
    code: ErrorCode,
    message: String,
    source: Option<Box<dyn StdError + Send + Sync>>,
    context: BTreeMap<String, Value>,
}

impl RelayError {
    /// Build a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key/value of structured context.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.code.is_fatal()
    }

    /// A serializable snapshot suitable for structured logging.
    #[must_use]
    pub fn to_dto(&self) -> RelayErrorDto {
        RelayErrorDto {
            code: self.code,
            category: self.category(),
            message: self.message.clone(),
            context: self.context.clone(),
        }
    }
}

impl fmt::Debug for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayError")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("context", &self.context)
            .field("source", &self.source.as_ref().map(|s| s.to_string()))
            .finish()
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl StdError for RelayError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn StdError + 'static))
    }
}

/// Owned, serializable snapshot of a [`RelayError`] for logging or wire
/// transport (the underlying source, if any, is not serializable and is
/// dropped).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayErrorDto {
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub message: String,
    pub context: BTreeMap<String, Value>,
}

impl From<&RelayError> for RelayErrorDto {
    fn from(err: &RelayError) -> Self {
        err.to_dto()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::PacketTooShort,
        ErrorCode::LengthMismatch,
        ErrorCode::UnknownPacketType,
        ErrorCode::DecodeFailure,
        ErrorCode::CorrelatorMiss,
        ErrorCode::QueueEmpty,
        ErrorCode::QueueIoFailure,
        ErrorCode::PublishFailure,
        ErrorCode::CredentialExpired,
        ErrorCode::ConfigFatal,
    ];

    #[test]
    fn every_code_has_a_category() {
        for code in ALL_CODES {
            let _ = code.category();
        }
    }

    #[test]
    fn only_config_fatal_is_fatal() {
        for code in ALL_CODES {
            assert_eq!(code.is_fatal(), matches!(code, ErrorCode::ConfigFatal));
        }
    }

    #[test]
    fn validation_codes_map_to_validation_category() {
        assert_eq!(ErrorCode::PacketTooShort.category(), ErrorCategory::Validation);
        assert_eq!(ErrorCode::LengthMismatch.category(), ErrorCategory::Validation);
    }

    #[test]
    fn builder_chains_context_and_source() {
        let io_err = std::io::Error::other("disk full");
        let err = RelayError::new(ErrorCode::QueueIoFailure, "segment write failed")
            .with_context("segment", 42)
            .with_source(io_err);
        assert_eq!(err.code(), ErrorCode::QueueIoFailure);
        assert_eq!(err.context().get("segment").and_then(Value::as_i64), Some(42));
        assert!(err.source().is_some());
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = RelayError::new(ErrorCode::ConfigFatal, "missing token file");
        let rendered = err.to_string();
        assert!(rendered.contains("CONFIG_FATAL"));
        assert!(rendered.contains("missing token file"));
    }

    #[test]
    fn dto_roundtrips_through_json() {
        let err = RelayError::new(ErrorCode::PublishFailure, "confirm timed out")
            .with_context("worker", 3);
        let dto = err.to_dto();
        let json = serde_json::to_string(&dto).unwrap();
        let back: RelayErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, ErrorCode::PublishFailure);
        assert_eq!(back.message, "confirm timed out");
    }

    #[test]
    fn code_as_str_is_screaming_snake_case() {
        assert_eq!(ErrorCode::PacketTooShort.as_str(), "PACKET_TOO_SHORT");
        assert_eq!(ErrorCode::CredentialExpired.as_str(), "CREDENTIAL_EXPIRED");
    }
}
