//! User resolution, domain derivation, and the `=`-packet server-identity
//! grammar.

use xrm_types::{ServerInfo, UserInfo};

use crate::maps::DictEntry;

/// Result of resolving a file record's `userId` against the dict map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    Known(UserInfo),
    /// No dict entry found; falls back to the hex-encoded `userId` as the
    /// user field.
    Fallback(String),
}

/// Resolve `userId` to a `UserInfo`: first by direct `dictid` lookup, then
/// by the path dict's own leading `userInfo` (since a path dict's `dictId`
/// is reused as the `fileId` on the Open record it describes), falling
/// back to the hex-encoded id.
#[must_use]
pub fn resolve_user_info(dict_map: &crate::maps::DictMap, server_key: impl Fn(&str, u32) -> String, user_id: u32, file_id: u32) -> UserLookup {
    if let Some(DictEntry::User(info)) = dict_map.get(&server_key("dictid", user_id)) {
        return UserLookup::Known(info);
    }
    if let Some(DictEntry::Path(path_info)) = dict_map.get(&server_key("dict", file_id)) {
        if let Ok(info) = xrm_parser::parse_user_info(&path_info.raw_user_info) {
            return UserLookup::Known(info);
        }
    }
    UserLookup::Fallback(format!("{user_id:x}"))
}

/// A host looks IP-like if it is bracketed (`[::1]`), starts with a colon
/// (compressed IPv6), starts with `f` (e.g. `fe80::...`), or starts with a
/// digit or dot (IPv4).
#[must_use]
pub fn looks_like_ip(host: &str) -> bool {
    host.starts_with('[')
        || host.starts_with(':')
        || host.starts_with('f')
        || host.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '.')
}

/// Derive the `user_domain` field: the bare IP for IP-like hosts, else the
/// last two DNS labels. Reverse-DNS resolution is not performed.
#[must_use]
pub fn derive_user_domain(host: &str) -> Option<String> {
    if host.is_empty() {
        return None;
    }
    if looks_like_ip(host) {
        return Some(host.trim_start_matches('[').trim_end_matches(']').to_string());
    }
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() >= 2 {
        Some(labels[labels.len() - 2..].join("."))
    } else {
        Some(host.to_string())
    }
}

/// Parse a `=`-packet's `&pgm=&ver=&inst=&site=&port=&host=` identity
/// string. Unknown keys are ignored.
#[must_use]
pub fn parse_server_ident(raw: &str) -> ServerInfo {
    let mut info = ServerInfo::default();
    for pair in raw.split('&').filter(|s| !s.is_empty()) {
        let Some((key, val)) = pair.split_once('=') else { continue };
        match key {
            "pgm" => info.pgm = val.to_string(),
            "ver" => info.ver = val.to_string(),
            "inst" => info.instance = val.to_string(),
            "site" => info.site = val.to_string(),
            "host" => info.host = val.to_string(),
            "port" => info.port = val.parse().unwrap_or(0),
            _ => {}
        }
    }
    info
}
