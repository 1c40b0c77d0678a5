//! The emitted collector record: the join of identity, timing, user/token
//! enrichment, and transfer statistics for one completed (or standalone)
//! file close.

use serde::{Deserialize, Serialize};

/// Per-operation min/max/average, included for read, read-single,
/// read-vector, and write operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OpStats {
    pub min: u32,
    pub max: u32,
    pub average: f64,
}

/// A complete file-access record, constructed once per file-close (or
/// standalone close) and emitted downstream as collector output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorRecord {
    #[serde(rename = "@timestamp")]
    pub timestamp: i64,
    pub server_id: String,
    pub server_hostname: String,
    pub server: String,
    pub server_ip: String,
    pub site: String,

    pub user: String,
    pub user_dn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vo: Option<String>,
    pub host: String,
    pub protocol: String,
    pub appinfo: String,
    pub ipv6: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_org: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_groups: Option<Vec<String>>,

    pub filename: String,
    pub dirname1: String,
    pub dirname2: String,
    pub logical_dirname: String,
    pub filesize: u64,
    pub start_time: i64,
    pub end_time: i64,
    pub operation_time: i64,

    pub read: u64,
    pub readv: u64,
    pub write: u64,
    pub read_single_bytes: u64,
    pub read_bytes_at_close: u64,
    pub write_bytes_at_close: u64,

    pub read_operations: u32,
    pub read_single_operations: u32,
    pub read_vector_operations: u32,
    pub write_operations: u32,
    pub read_stats: OpStats,
    pub read_single_stats: OpStats,
    pub read_vector_stats: OpStats,
    pub write_stats: OpStats,
    pub readv_segment_stats: OpStats,

    #[serde(rename = "HasFileCloseMsg")]
    pub has_file_close_msg: u8,
}
