//! Value types and type aliases for the correlator's four TTL maps.

use std::time::Duration;

use xrm_statemap::TtlMap;
use xrm_types::{FileState, PathInfo, ServerInfo, UserInfo, UserState};

/// An entry in the dict map: either the path a `dictId` names (from a `d`
/// packet), or the user that `dictId` belongs to (from the same packet's
/// leading `userInfo`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictEntry {
    Path(PathInfo),
    User(UserInfo),
}

/// Open file and pending time records, keyed `{server}-file-{fileId}` and
/// `{server}-time-{fileId}-{sid}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEntry {
    OpenFile(FileState),
    PendingTime(xrm_types::FileSubRecord),
}

pub type StateMap = TtlMap<StateEntry>;
pub type UserMap = TtlMap<UserState>;
pub type DictMap = TtlMap<DictEntry>;
pub type ServerMap = TtlMap<ServerInfo>;

/// Build the four maps sharing one entry TTL and capacity, per the entry's
/// statemap configuration.
#[must_use]
pub fn build_maps(
    ttl: Duration,
    max_entries: usize,
) -> (
    std::sync::Arc<StateMap>,
    std::sync::Arc<UserMap>,
    std::sync::Arc<DictMap>,
    std::sync::Arc<ServerMap>,
) {
    (
        StateMap::new(ttl, max_entries),
        UserMap::new(ttl, max_entries),
        DictMap::new(ttl, max_entries),
        ServerMap::new(ttl, max_entries),
    )
}
