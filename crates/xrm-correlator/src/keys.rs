//! Map-key construction shared across the correlator's four TTL maps.

use xrm_types::UserInfo;

/// Reconstruct the raw `[proto/]user.pid:sid@host` string a `UserInfo` was
/// parsed from, used as the `userinfo` namespace key in the user map.
#[must_use]
pub fn user_info_key(info: &UserInfo) -> String {
    match &info.protocol {
        Some(proto) => format!("{proto}/{}.{}:{}@{}", info.user, info.pid, info.sid, info.host),
        None => format!("{}.{}:{}@{}", info.user, info.pid, info.sid, info.host),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_protocol() {
        let info = UserInfo {
            protocol: Some("xrootd".into()),
            user: "alice".into(),
            pid: 1,
            sid: 2,
            host: "h".into(),
        };
        assert_eq!(user_info_key(&info), "xrootd/alice.1:2@h");
    }

    #[test]
    fn round_trips_without_protocol() {
        let info = UserInfo {
            protocol: None,
            user: "bob".into(),
            pid: 3,
            sid: 4,
            host: "h2".into(),
        };
        assert_eq!(user_info_key(&info), "bob.3:4@h2");
    }
}
