//! Parsed packet and sub-record shapes produced by the wire-format decoder.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::header::Header;

/// The kind of top-level map packet (`=`, `d`, `i`, `U`), distinguishing
/// what a `dictId -> raw text` pair means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapRecordKind {
    /// `=`: server identification.
    ServerIdent,
    /// `d`: path dictionary (`userInfo\npath`).
    PathDict,
    /// `i`: application info (`userInfo\nappinfo`).
    AppInfo,
    /// `U`: extended activity info (`userInfo\n&Uc=...&Ec=...&Ac=...`).
    ExtendedActivity,
}

/// A `u`/`T`-type user record: login+auth, or token augmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRecordKind {
    /// `u`: user login plus auth protocol details.
    Login,
    /// `T`: token info referencing an existing user by `dictId`.
    Token,
}

/// The 48-byte ops-stats block optionally trailing a close record
/// (recFlag bit 1): per-operation counts and min/max, plus readv segment
/// counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseOpsStats {
    pub read_ops: u32,
    pub read_min: u32,
    pub read_max: u32,
    pub readv_ops: u32,
    pub readv_min: u32,
    pub readv_max: u32,
    pub rsegs: u32,
    pub rsegs_min: u32,
    pub rsegs_max: u32,
    pub write_ops: u32,
    pub write_min: u32,
    pub write_max: u32,
}

impl CloseOpsStats {
    pub const ENCODED_SIZE: usize = 48;
}

/// One file sub-record from an `f` (file-stat stream) or `t` (trace
/// stream) packet. All variants share the 8-byte common prefix
/// `{recType, recFlag, recSize, fileId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileSubRecord {
    Open {
        file_id: u32,
        rec_flag: u8,
        user_id: Option<u32>,
        file_size: u64,
        lfn: String,
    },
    Close {
        file_id: u32,
        rec_flag: u8,
        read: u64,
        readv: u64,
        write: u64,
        ops: Option<CloseOpsStats>,
    },
    Time {
        file_id: u32,
        rec_flag: u8,
        nrecs0: u16,
        nrecs1: u16,
        t_beg: u32,
        t_end: u32,
        sid: u64,
    },
    /// No body: the common prefix's fourth word carries the disconnecting
    /// user's `dictId`, not a file id. `file_id` is unused here.
    Disc {
        file_id: u32,
        rec_flag: u8,
        user_id: u32,
    },
}

impl FileSubRecord {
    #[must_use]
    pub fn file_id(&self) -> u32 {
        match self {
            FileSubRecord::Open { file_id, .. }
            | FileSubRecord::Close { file_id, .. }
            | FileSubRecord::Time { file_id, .. }
            | FileSubRecord::Disc { file_id, .. } => *file_id,
        }
    }
}

/// g-stream event stream type, from the top byte of the packet's `ident`
/// field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GStreamType {
    Cache,
    Tcp,
    Tpc,
    Unknown(u8),
}

impl GStreamType {
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'C' => GStreamType::Cache,
            b'T' => GStreamType::Tcp,
            b'P' => GStreamType::Tpc,
            other => GStreamType::Unknown(other),
        }
    }
}

/// The fully decoded shape of one UDP datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPacket {
    /// First byte `'<'`: an XML summary packet, passed through unparsed.
    XmlSummary(Vec<u8>),
    /// First byte `'{'`: a JSON-literal packet, passed through unparsed.
    JsonLiteral(Vec<u8>),
    /// `=`, `d`, `i`, `U`: a dictId-keyed map record.
    Map {
        header: Header,
        kind: MapRecordKind,
        dict_id: u32,
        raw: String,
    },
    /// `u`, `T`: a user login or token record.
    User {
        header: Header,
        kind: UserRecordKind,
        dict_id: u32,
        raw: String,
    },
    /// `f`: file-stat stream, a sequence of sub-records.
    FileStream {
        header: Header,
        records: Vec<FileSubRecord>,
    },
    /// `t`: trace stream, a sequence of sub-records.
    TraceStream {
        header: Header,
        records: Vec<FileSubRecord>,
    },
    /// `g`: g-stream cache/TCP/TPC event batch.
    GStream {
        header: Header,
        begin: u32,
        end: u32,
        ident: u64,
        stream_type: GStreamType,
        events: Vec<Value>,
    },
    /// `r`, `p`, `x`: redirect, purge, transfer — recognized, passed
    /// through without further decoding.
    Passthrough { header: Header, code: u8 },
}
