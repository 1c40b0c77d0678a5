//! User, auth, and token identity records carried on `d`/`i`/`U`/`u`/`T`
//! packets, and the aggregate `UserState` the correlator builds from them.

use serde::{Deserialize, Serialize};

/// Parsed `[proto/]user.pid:sid@host` identity string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub protocol: Option<String>,
    pub user: String,
    pub pid: u32,
    pub sid: u32,
    pub host: String,
}

/// Auth protocol details carried on `u`-type user login packets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub protocol: Option<String>,
    pub dn: Option<String>,
    pub host: Option<String>,
    pub organization: Option<String>,
    pub role: Option<String>,
    pub groups: Vec<String>,
    pub inet_version: Option<String>,
}

impl AuthInfo {
    /// The DN prefix before the first `"::"`, or the whole DN if absent.
    #[must_use]
    pub fn dn_prefix(&self) -> Option<&str> {
        self.dn.as_deref().map(|dn| match dn.split_once("::") {
            Some((prefix, _)) => prefix,
            None => dn,
        })
    }
}

/// Token enrichment carried on `T`-type packets, referencing an existing
/// user by `dictId`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub user_dict_id: u32,
    pub subject: Option<String>,
    pub username: Option<String>,
    pub organization: Option<String>,
    pub role: Option<String>,
    pub groups: Vec<String>,
}

/// Extended-activity augmentation carried on `U`-type packets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityInfo {
    pub user_dict_id: u32,
    pub experiment_code: Option<String>,
    pub activity_code: Option<String>,
}

/// Aggregate user state owned by the correlator: everything known about one
/// logical login across `d`/`i`/`U`/`u`/`T` packets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    pub user_info: Option<UserInfo>,
    pub auth_info: Option<AuthInfo>,
    pub token_info: Option<TokenInfo>,
    pub app_info: Option<String>,
    pub experiment_code: Option<String>,
    pub activity_code: Option<String>,
}

impl UserState {
    /// A minimal state synthesized when only a `UserInfo` is known.
    #[must_use]
    pub fn from_user_info(user_info: UserInfo) -> Self {
        Self {
            user_info: Some(user_info),
            ..Self::default()
        }
    }

    /// Merge another state's fields into this one, preferring `other`'s
    /// values when both are set. Used when a later packet augments an
    /// already-known user (token augmentation, app-info, activity-info).
    pub fn merge(&mut self, other: UserState) {
        if other.user_info.is_some() {
            self.user_info = other.user_info;
        }
        if other.auth_info.is_some() {
            self.auth_info = other.auth_info;
        }
        if other.token_info.is_some() {
            self.token_info = other.token_info;
        }
        if other.app_info.is_some() {
            self.app_info = other.app_info;
        }
        if other.experiment_code.is_some() {
            self.experiment_code = other.experiment_code;
        }
        if other.activity_code.is_some() {
            self.activity_code = other.activity_code;
        }
    }
}
