//! Open-file state and server identification records.

use serde::{Deserialize, Serialize};

/// An open file tracked between its open and close (or disconnect/TTL)
/// events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub file_id: u32,
    pub user_id: u32,
    pub open_time: i64,
    pub file_size: u64,
    pub filename: String,
    pub server_id: String,
}

/// Path dictionary entry: the logical filename associated with a `dictId`
/// on `d`-type packets, plus the raw `userInfo` prefix it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathInfo {
    pub path: String,
    pub raw_user_info: String,
}

/// Server identification, refreshed (reset-on-write TTL) on every `=`
/// packet from that server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub site: String,
    pub port: u16,
    pub instance: String,
    pub pgm: String,
    pub ver: String,
    pub host: String,
}
