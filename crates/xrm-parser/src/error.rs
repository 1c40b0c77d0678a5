use thiserror::Error;
use xrm_error::{ErrorCode, RelayError};

/// Local parse error, matching the kind table of the error handling
/// design: `too_short | length_mismatch | unknown_type | decode_failure`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("packet too short: {detail}")]
    TooShort { detail: String },
    #[error("length mismatch: {detail}")]
    LengthMismatch { detail: String },
    #[error("unknown packet type {code:#04x}: {detail}")]
    UnknownType { code: u8, detail: String },
    #[error("decode failure: {detail}")]
    DecodeFailure { detail: String },
}

impl From<ParseError> for RelayError {
    fn from(err: ParseError) -> Self {
        let code = match &err {
            ParseError::TooShort { .. } => ErrorCode::PacketTooShort,
            ParseError::LengthMismatch { .. } => ErrorCode::LengthMismatch,
            ParseError::UnknownType { .. } => ErrorCode::UnknownPacketType,
            ParseError::DecodeFailure { .. } => ErrorCode::DecodeFailure,
        };
        RelayError::new(code, err.to_string())
    }
}
