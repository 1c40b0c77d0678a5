//! The 8-byte datagram header and the composite server identity derived
//! from it.

use std::fmt;

/// 8-byte packet header shared by every XRootD monitoring datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Single ASCII byte identifying the packet type.
    pub type_code: u8,
    /// Per-server sequence counter.
    pub sequence: u8,
    /// Declared payload length (`plen`), including the header itself.
    pub len: u16,
    /// Epoch-seconds timestamp of the emitting server's start, identifying
    /// its current uptime epoch.
    pub server_start: i32,
}

impl Header {
    pub const SIZE: usize = 8;

    /// Decode the 8-byte big-endian header from the front of `buf`.
    ///
    /// Returns `None` if `buf` is shorter than [`Header::SIZE`].
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            type_code: buf[0],
            sequence: buf[1],
            len: u16::from_be_bytes([buf[2], buf[3]]),
            server_start: i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }
}

/// Composite identity for an emitting server's uptime epoch:
/// `"{serverStart}#{host}:{port}"`.
///
/// `dictId` values are unique only within one `ServerId`; every correlator
/// map key is prefixed with a `ServerId` to avoid cross-server collisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerId(String);

impl ServerId {
    /// Build a `ServerId` from a header's `server_start` and the remote
    /// `host:port` the datagram arrived from.
    #[must_use]
    pub fn new(server_start: i32, remote_host_port: &str) -> Self {
        Self(format!("{server_start}#{remote_host_port}"))
    }

    /// Build a `ServerId` from an already-composed string (used when
    /// recovering keys read back out of the state maps).
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build a namespaced map key of the form `"{serverId}-{namespace}-{id}"`.
    #[must_use]
    pub fn key(&self, namespace: &str, id: impl fmt::Display) -> String {
        format!("{}-{}-{}", self.0, namespace, id)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_short_buffers() {
        assert!(Header::decode(&[0u8; 7]).is_none());
    }

    #[test]
    fn decode_reads_big_endian_fields() {
        let buf = [b'=', 0x03, 0x00, 0x10, 0x00, 0x00, 0x01, 0x2c];
        let header = Header::decode(&buf).unwrap();
        assert_eq!(header.type_code, b'=');
        assert_eq!(header.sequence, 0x03);
        assert_eq!(header.len, 16);
        assert_eq!(header.server_start, 300);
    }

    #[test]
    fn server_id_formats_with_hash() {
        let id = ServerId::new(1000, "10.0.0.1:1094");
        assert_eq!(id.as_str(), "1000#10.0.0.1:1094");
    }

    #[test]
    fn key_namespaces_with_server_id_prefix() {
        let id = ServerId::new(1000, "10.0.0.1:1094");
        assert_eq!(id.key("file", 123), "1000#10.0.0.1:1094-file-123");
    }
}
