//! Text sub-grammars embedded in packet payloads: `userInfo`, `authInfo`,
//! `tokenInfo`, and the extended-activity `&Uc=&Ec=&Ac=` triple.

use xrm_types::{ActivityInfo, AuthInfo, TokenInfo, UserInfo};

use crate::error::ParseError;

/// Parse `[proto/]user.pid:sid@host`.
///
/// Fails if `@`, `:`, or `.` is missing.
pub fn parse_user_info(raw: &str) -> Result<UserInfo, ParseError> {
    let (protocol, rest) = match raw.split_once('/') {
        Some((proto, rest)) => (Some(proto.to_string()), rest),
        None => (None, raw),
    };

    let (user_pid, sid_host) = rest.split_once(':').ok_or_else(|| ParseError::DecodeFailure {
        detail: format!("userInfo missing ':' separator: {raw:?}"),
    })?;
    let (user, pid) = user_pid.split_once('.').ok_or_else(|| ParseError::DecodeFailure {
        detail: format!("userInfo missing '.' separator: {raw:?}"),
    })?;
    let (sid, host) = sid_host.split_once('@').ok_or_else(|| ParseError::DecodeFailure {
        detail: format!("userInfo missing '@' separator: {raw:?}"),
    })?;

    let pid: u32 = pid.parse().map_err(|_| ParseError::DecodeFailure {
        detail: format!("userInfo pid not numeric: {raw:?}"),
    })?;
    let sid: u32 = sid.parse().map_err(|_| ParseError::DecodeFailure {
        detail: format!("userInfo sid not numeric: {raw:?}"),
    })?;

    if user.is_empty() || host.is_empty() {
        return Err(ParseError::DecodeFailure {
            detail: format!("userInfo has empty user or host: {raw:?}"),
        });
    }

    Ok(UserInfo {
        protocol,
        user: user.to_string(),
        pid,
        sid,
        host: host.to_string(),
    })
}

/// Split `&key=val&key=val...` into pairs, ignoring a leading empty
/// segment and any key with no recognized meaning.
fn kv_pairs(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    raw.split('&').filter_map(|segment| {
        if segment.is_empty() {
            return None;
        }
        segment.split_once('=')
    })
}

/// Parse auth protocol details from an `&key=val...` string. Unknown keys
/// are ignored; this never fails.
#[must_use]
pub fn parse_auth_info(raw: &str) -> AuthInfo {
    let mut auth = AuthInfo::default();
    for (key, val) in kv_pairs(raw) {
        match key {
            "p" => auth.protocol = Some(val.to_string()),
            "n" => auth.dn = Some(val.to_string()),
            "h" => auth.host = Some(val.to_string()),
            "o" => auth.organization = Some(val.to_string()),
            "r" => auth.role = Some(val.to_string()),
            "g" => auth.groups = val.split(':').map(str::to_string).filter(|s| !s.is_empty()).collect(),
            "I" => auth.inet_version = Some(val.to_string()),
            _ => {}
        }
    }
    auth
}

/// Parse token info from a `&Uc=<udid>&s=...&n=...&o=...&r=...&g=...`
/// string.
#[must_use]
pub fn parse_token_info(raw: &str) -> TokenInfo {
    let mut token = TokenInfo::default();
    for (key, val) in kv_pairs(raw) {
        match key {
            "Uc" => token.user_dict_id = val.parse().unwrap_or(0),
            "s" => token.subject = Some(val.to_string()),
            "n" => token.username = Some(val.to_string()),
            "o" => token.organization = Some(val.to_string()),
            "r" => token.role = Some(val.to_string()),
            "g" => token.groups = val.split(':').map(str::to_string).filter(|s| !s.is_empty()).collect(),
            _ => {}
        }
    }
    token
}

/// Parse extended-activity info from a `&Uc=<udid>&Ec=<expCode>&Ac=<actCode>`
/// string.
#[must_use]
pub fn parse_activity_info(raw: &str) -> ActivityInfo {
    let mut activity = ActivityInfo::default();
    for (key, val) in kv_pairs(raw) {
        match key {
            "Uc" => activity.user_dict_id = val.parse().unwrap_or(0),
            "Ec" => activity.experiment_code = Some(val.to_string()),
            "Ac" => activity.activity_code = Some(val.to_string()),
            _ => {}
        }
    }
    activity
}
