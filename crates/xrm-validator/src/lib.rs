//! Cheap datagram validation and JSON packaging for the shoveling path.

mod ip_map;

pub use ip_map::IpMap;

use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::json;
use thiserror::Error;
use xrm_error::{ErrorCode, RelayError};

/// Header shape used only for the validator's own big-endian length check
/// (mirrors `xrm_types::Header` without a dependency on the full type).
struct RawHeader {
    plen: u16,
}

impl RawHeader {
    fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < 8 {
            return None;
        }
        Some(Self {
            plen: u16::from_be_bytes([buf[2], buf[3]]),
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("packet too short: {len} bytes")]
    TooShort { len: usize },
    #[error("length mismatch: header declared {declared}, datagram is {actual}")]
    LengthMismatch { declared: u16, actual: usize },
}

impl From<ValidationError> for RelayError {
    fn from(err: ValidationError) -> Self {
        let code = match &err {
            ValidationError::TooShort { .. } => ErrorCode::PacketTooShort,
            ValidationError::LengthMismatch { .. } => ErrorCode::LengthMismatch,
        };
        RelayError::new(code, err.to_string())
    }
}

/// Outcome of classifying one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validated {
    XmlSummary { routing_key: String },
    JsonLiteral { routing_key: String },
    Binary { routing_key: String },
}

impl Validated {
    #[must_use]
    pub fn routing_key(&self) -> &str {
        match self {
            Validated::XmlSummary { routing_key }
            | Validated::JsonLiteral { routing_key }
            | Validated::Binary { routing_key } => routing_key,
        }
    }
}

/// Cheap header sanity check plus XML/JSON classification.
#[derive(Debug)]
pub struct Validator {
    summary_counter: AtomicU64,
    json_counter: AtomicU64,
    verify: bool,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            summary_counter: AtomicU64::new(0),
            json_counter: AtomicU64::new(0),
            verify: true,
        }
    }
}

impl Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a validator whose `verify` flag controls whether the
    /// declared-length check runs at all; `false` accepts any datagram
    /// long enough to carry a header, trusting the sender.
    #[must_use]
    pub fn with_verify(verify: bool) -> Self {
        Self { verify, ..Self::default() }
    }

    /// Classify and validate one datagram.
    pub fn validate(&self, buf: &[u8]) -> Result<Validated, ValidationError> {
        if buf.first() == Some(&b'<') {
            let n = self.summary_counter.fetch_add(1, Ordering::Relaxed);
            return Ok(Validated::XmlSummary {
                routing_key: format!("summary-{n}"),
            });
        }
        if buf.first() == Some(&b'{') {
            let n = self.json_counter.fetch_add(1, Ordering::Relaxed);
            return Ok(Validated::JsonLiteral {
                routing_key: format!("json-{n}"),
            });
        }
        if buf.len() < 8 {
            return Err(ValidationError::TooShort { len: buf.len() });
        }
        let header = RawHeader::decode(buf).expect("length already checked");
        if self.verify && header.plen as usize != buf.len() {
            return Err(ValidationError::LengthMismatch {
                declared: header.plen,
                actual: buf.len(),
            });
        }
        let server_start = i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Ok(Validated::Binary {
            routing_key: server_start.to_string(),
        })
    }
}

/// Wraps a raw datagram plus remote address into the shoveling path's JSON
/// envelope, applying the configured IP-rewrite mapping.
pub struct Packager {
    version: String,
    ip_map: IpMap,
}

impl Packager {
    #[must_use]
    pub fn new(version: impl Into<String>, ip_map: IpMap) -> Self {
        Self {
            version: version.into(),
            ip_map,
        }
    }

    /// Build the compact JSON envelope: `{"remote","version","data"}`.
    #[must_use]
    pub fn package(&self, datagram: &[u8], remote_ip: &str, remote_port: u16) -> String {
        let rewritten_ip = self.ip_map.rewrite(remote_ip);
        let remote = format!("{rewritten_ip}:{remote_port}");
        let data = BASE64.encode(datagram);
        json!({
            "remote": remote,
            "version": self.version,
            "data": data,
        })
        .to_string()
    }
}
