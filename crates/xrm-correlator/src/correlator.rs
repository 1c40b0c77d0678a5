//! The stateful join engine: dispatches decoded packets against the four
//! TTL maps and emits completed file-access records.

use std::time::Duration;

use serde_json::Value;
use xrm_parser::{parse_activity_info, parse_auth_info, parse_token_info, parse_user_info};
use xrm_types::{CollectorRecord, FileState, FileSubRecord, MapRecordKind, ParsedPacket, ServerId, UserRecordKind, UserState};

use crate::enrichment::{parse_server_ident, resolve_user_info, UserLookup};
use crate::keys::user_info_key;
use crate::maps::{build_maps, DictEntry, DictMap, ServerMap, StateEntry, StateMap, UserMap};
use crate::record::{build_record, server_ip_from_id, CloseFields, FileContext};

/// Aggregate size of the four TTL maps, reported for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateSize {
    pub state_entries: usize,
    pub user_entries: usize,
    pub dict_entries: usize,
    pub server_entries: usize,
}

/// The stateful correlator: owns the four TTL maps joining path, user,
/// auth, token, and open-file state into completed access records.
pub struct Correlator {
    state_map: std::sync::Arc<StateMap>,
    user_map: std::sync::Arc<UserMap>,
    dict_map: std::sync::Arc<DictMap>,
    server_map: std::sync::Arc<ServerMap>,
}

impl Correlator {
    /// Build a correlator whose four maps share one entry TTL and
    /// per-map capacity (`0` meaning unlimited).
    #[must_use]
    pub fn new(entry_ttl: Duration, max_entries: usize) -> Self {
        let (state_map, user_map, dict_map, server_map) = build_maps(entry_ttl, max_entries);
        Self {
            state_map,
            user_map,
            dict_map,
            server_map,
        }
    }

    #[must_use]
    pub fn state_size(&self) -> StateSize {
        StateSize {
            state_entries: self.state_map.size(),
            user_entries: self.user_map.size(),
            dict_entries: self.dict_map.size(),
            server_entries: self.server_map.size(),
        }
    }

    /// Stop the background janitor tasks on all four maps.
    pub fn stop(&self) {
        self.state_map.stop();
        self.user_map.stop();
        self.dict_map.stop();
        self.server_map.stop();
    }

    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn user_state_for(&self, server: &ServerId, lookup: &UserLookup) -> Option<UserState> {
        match lookup {
            UserLookup::Known(info) => self.user_map.get(&server.key("userinfo", user_info_key(info))),
            UserLookup::Fallback(_) => None,
        }
    }

    fn resolve_user(&self, server: &ServerId, user_id: u32, file_id: u32) -> UserLookup {
        let dict_map = &self.dict_map;
        resolve_user_info(dict_map, |ns, id| server.key(ns, id), user_id, file_id)
    }

    /// Process one decoded packet. Returns zero or more completed
    /// collector records; most packet types only update map state and
    /// return nothing. `g`-stream packets are handled separately by
    /// [`Correlator::process_gstream_packet`].
    pub fn process_packet(&self, packet: &ParsedPacket, remote: &str) -> Vec<CollectorRecord> {
        match packet {
            ParsedPacket::XmlSummary(_) | ParsedPacket::JsonLiteral(_) | ParsedPacket::Passthrough { .. } | ParsedPacket::GStream { .. } => vec![],
            ParsedPacket::Map { header, kind, dict_id, raw } => {
                self.process_map(ServerId::new(header.server_start, remote), *kind, *dict_id, raw);
                vec![]
            }
            ParsedPacket::User { header, kind, dict_id, raw } => {
                self.process_user(ServerId::new(header.server_start, remote), *kind, *dict_id, raw);
                vec![]
            }
            ParsedPacket::FileStream { header, records } | ParsedPacket::TraceStream { header, records } => {
                let server = ServerId::new(header.server_start, remote);
                records.iter().filter_map(|rec| self.process_file_record(&server, rec)).collect()
            }
        }
    }

    /// Enrich every event in a `g`-stream batch with `sid`, `server_ip`,
    /// and `from` fields and pass it through unchanged otherwise.
    #[must_use]
    pub fn process_gstream_packet(&self, packet: &ParsedPacket, remote: &str) -> Vec<Value> {
        let ParsedPacket::GStream { header, events, .. } = packet else {
            return vec![];
        };
        let server = ServerId::new(header.server_start, remote);
        let server_ip = server_ip_from_id(server.as_str());
        events
            .iter()
            .cloned()
            .map(|mut event| {
                if let Value::Object(map) = &mut event {
                    map.insert("sid".to_string(), Value::String(server.as_str().to_string()));
                    map.insert("server_ip".to_string(), Value::String(server_ip.clone()));
                    map.insert("from".to_string(), Value::String(remote.to_string()));
                }
                event
            })
            .collect()
    }

    fn process_map(&self, server: ServerId, kind: MapRecordKind, dict_id: u32, raw: &str) {
        match kind {
            MapRecordKind::ServerIdent => {
                self.server_map.set(server.as_str(), parse_server_ident(raw));
            }
            MapRecordKind::PathDict => {
                let (user_info_raw, path) = raw.split_once('\n').unwrap_or((raw, ""));
                self.dict_map.set(
                    server.key("dict", dict_id),
                    DictEntry::Path(xrm_types::PathInfo {
                        path: path.to_string(),
                        raw_user_info: user_info_raw.to_string(),
                    }),
                );
                if let Ok(info) = parse_user_info(user_info_raw) {
                    self.dict_map.set(server.key("dictid", dict_id), DictEntry::User(info));
                }
            }
            MapRecordKind::AppInfo => {
                let (user_info_raw, appinfo) = raw.split_once('\n').unwrap_or((raw, ""));
                let Ok(info) = parse_user_info(user_info_raw) else {
                    tracing::debug!(target: "relay.correlator", raw = user_info_raw, "app-info packet with unparsable userInfo");
                    return;
                };
                let key = server.key("userinfo", user_info_key(&info));
                let mut state = self.user_map.get(&key).unwrap_or_default();
                if state.user_info.is_none() {
                    state.user_info = Some(info);
                }
                state.app_info = Some(appinfo.to_string());
                self.user_map.set(key, state);
            }
            MapRecordKind::ExtendedActivity => {
                let (user_info_raw, activity_raw) = raw.split_once('\n').unwrap_or((raw, ""));
                let activity = parse_activity_info(activity_raw);
                let referenced = self.dict_map.get(&server.key("dictid", activity.user_dict_id));
                let info = match referenced {
                    Some(DictEntry::User(info)) => Some(info),
                    _ => parse_user_info(user_info_raw).ok(),
                };
                let Some(info) = info else {
                    tracing::debug!(target: "relay.correlator", user_dict_id = activity.user_dict_id, "extended-activity references unknown user, dropping");
                    return;
                };
                let key = server.key("userinfo", user_info_key(&info));
                let mut state = self.user_map.get(&key).unwrap_or_else(|| UserState::from_user_info(info));
                state.experiment_code = activity.experiment_code;
                state.activity_code = activity.activity_code;
                self.user_map.set(key, state);
            }
        }
    }

    fn process_user(&self, server: ServerId, kind: UserRecordKind, dict_id: u32, raw: &str) {
        match kind {
            UserRecordKind::Login => {
                let (user_info_raw, auth_raw) = raw.split_once('\n').unwrap_or((raw, ""));
                let Ok(info) = parse_user_info(user_info_raw) else {
                    tracing::debug!(target: "relay.correlator", raw = user_info_raw, "login packet with unparsable userInfo");
                    return;
                };
                let auth = parse_auth_info(auth_raw);
                let key = server.key("userinfo", user_info_key(&info));
                let mut state = self.user_map.get(&key).unwrap_or_default();
                state.user_info = Some(info.clone());
                state.auth_info = Some(auth);
                self.user_map.set(key, state);
                self.dict_map.set(server.key("dictid", dict_id), DictEntry::User(info));
            }
            UserRecordKind::Token => {
                let (_own_user_info_raw, token_raw) = raw.split_once('\n').unwrap_or(("", raw));
                let token = parse_token_info(token_raw);
                if token.user_dict_id == 0 {
                    return;
                }
                let Some(DictEntry::User(info)) = self.dict_map.get(&server.key("dictid", token.user_dict_id)) else {
                    tracing::debug!(target: "relay.correlator", user_dict_id = token.user_dict_id, "token references unknown user, dropping");
                    return;
                };
                let key = server.key("userinfo", user_info_key(&info));
                let mut state = self.user_map.get(&key).unwrap_or_else(|| UserState::from_user_info(info));
                state.token_info = Some(token);
                self.user_map.set(key, state);
            }
        }
    }

    fn process_file_record(&self, server: &ServerId, rec: &FileSubRecord) -> Option<CollectorRecord> {
        match rec {
            FileSubRecord::Open { file_id, user_id, file_size, lfn, .. } => {
                let filename = if !lfn.is_empty() {
                    lfn.clone()
                } else {
                    self.path_for_file_id(server, *file_id)
                };
                self.state_map.set(
                    server.key("file", file_id),
                    StateEntry::OpenFile(FileState {
                        file_id: *file_id,
                        user_id: user_id.unwrap_or(0),
                        open_time: self.now(),
                        file_size: *file_size,
                        filename,
                        server_id: server.as_str().to_string(),
                    }),
                );
                None
            }
            FileSubRecord::Close { file_id, read, readv, write, ops, .. } => {
                let end_time = self.now();
                let close_fields = CloseFields {
                    read: *read,
                    readv: *readv,
                    write: *write,
                    ops: *ops,
                    end_time,
                };
                match self.state_map.delete(&server.key("file", file_id)) {
                    Some(StateEntry::OpenFile(file_state)) => {
                        let user_lookup = self.resolve_user(server, file_state.user_id, file_state.file_id);
                        let user_state = self.user_state_for(server, &user_lookup);
                        let ctx = FileContext {
                            filename: file_state.filename,
                            open_time: file_state.open_time,
                            file_size: file_state.file_size,
                        };
                        let server_info = self.server_map.get(server.as_str()).unwrap_or_default();
                        Some(build_record(end_time, server, &server_info, &ctx, &close_fields, &user_lookup, user_state.as_ref()))
                    }
                    _ => {
                        let filename = self.path_for_file_id(server, *file_id);
                        let user_lookup = UserLookup::Fallback(format!("{file_id:x}"));
                        let ctx = FileContext {
                            filename,
                            open_time: end_time,
                            file_size: 0,
                        };
                        let server_info = self.server_map.get(server.as_str()).unwrap_or_default();
                        Some(build_record(end_time, server, &server_info, &ctx, &close_fields, &user_lookup, None))
                    }
                }
            }
            FileSubRecord::Time { file_id, sid, .. } => {
                self.state_map.set(server.key("time", format!("{file_id}-{sid}")), StateEntry::PendingTime(rec.clone()));
                None
            }
            FileSubRecord::Disc { user_id, .. } => {
                if let Some(DictEntry::User(info)) = self.dict_map.get(&server.key("dictid", user_id)) {
                    let key = server.key("userinfo", user_info_key(&info));
                    self.user_map.delete(&key);
                    self.dict_map.delete(&server.key("dictid", user_id));
                }
                None
            }
        }
    }

    fn path_for_file_id(&self, server: &ServerId, file_id: u32) -> String {
        match self.dict_map.get(&server.key("dict", file_id)) {
            Some(DictEntry::Path(path_info)) => path_info.path,
            _ => "unknown".to_string(),
        }
    }
}

impl Drop for Correlator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrm_types::Header;

    fn header() -> Header {
        Header {
            type_code: b'f',
            sequence: 0,
            len: 0,
            server_start: 1000,
        }
    }

    fn login(dict_id: u32, raw: &str) -> ParsedPacket {
        ParsedPacket::User {
            header: header(),
            kind: UserRecordKind::Login,
            dict_id,
            raw: raw.to_string(),
        }
    }

    fn path_dict(dict_id: u32, raw: &str) -> ParsedPacket {
        ParsedPacket::Map {
            header: header(),
            kind: MapRecordKind::PathDict,
            dict_id,
            raw: raw.to_string(),
        }
    }

    fn file_stream(records: Vec<FileSubRecord>) -> ParsedPacket {
        ParsedPacket::FileStream { header: header(), records }
    }

    #[tokio::test]
    async fn full_open_close_cycle_produces_enriched_record() {
        let correlator = Correlator::new(Duration::from_secs(300), 0);
        let remote = "10.0.0.1:1094";

        correlator.process_packet(&login(5, "xrootd/alice.1:2@client.example.org\n&p=gsi&n=/DC=org/CN=alice&o=CERN"), remote);
        correlator.process_packet(&path_dict(42, "xrootd/alice.1:2@client.example.org\n/store/x/file.root"), remote);

        let opens = correlator.process_packet(
            &file_stream(vec![FileSubRecord::Open {
                file_id: 42,
                rec_flag: 0,
                user_id: Some(5),
                file_size: 2048,
                lfn: String::new(),
            }]),
            remote,
        );
        assert!(opens.is_empty());

        let closes = correlator.process_packet(
            &file_stream(vec![FileSubRecord::Close {
                file_id: 42,
                rec_flag: 0,
                read: 1000,
                readv: 0,
                write: 0,
                ops: Some(xrm_types::CloseOpsStats {
                    read_ops: 2,
                    read_min: 400,
                    read_max: 600,
                    ..Default::default()
                }),
            }]),
            remote,
        );

        assert_eq!(closes.len(), 1);
        let record = &closes[0];
        assert_eq!(record.user, "alice");
        assert_eq!(record.filename, "/store/x/file.root");
        assert_eq!(record.user_dn, "/DC=org/CN=alice");
        assert_eq!(record.vo.as_deref(), Some("CERN"));
        assert_eq!(record.read_stats.average, 500.0);
        assert_eq!(correlator.state_size().state_entries, 0);
    }

    #[tokio::test]
    async fn close_without_matching_open_is_standalone_and_falls_back() {
        let correlator = Correlator::new(Duration::from_secs(300), 0);
        let closes = correlator.process_packet(
            &file_stream(vec![FileSubRecord::Close {
                file_id: 99,
                rec_flag: 0,
                read: 0,
                readv: 0,
                write: 0,
                ops: None,
            }]),
            "10.0.0.1:1094",
        );
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].filename, "unknown");
        assert_eq!(closes[0].user, "63");
        assert_eq!(closes[0].has_file_close_msg, 1);
    }

    #[tokio::test]
    async fn disconnect_clears_user_state_so_later_lookups_fall_back() {
        let correlator = Correlator::new(Duration::from_secs(300), 0);
        let remote = "10.0.0.1:1094";
        correlator.process_packet(&login(7, "bob.1:2@client.example.org\n&p=gsi"), remote);

        correlator.process_packet(
            &file_stream(vec![FileSubRecord::Disc {
                file_id: 0,
                rec_flag: 0,
                user_id: 7,
            }]),
            remote,
        );

        let closes = correlator.process_packet(
            &file_stream(vec![FileSubRecord::Close {
                file_id: 1,
                rec_flag: 0,
                read: 0,
                readv: 0,
                write: 0,
                ops: None,
            }]),
            remote,
        );
        // user 7 was never associated with file_id 1's dict entry, so the
        // disconnect's effect is only observable via state_size.
        assert_eq!(closes.len(), 1);
        assert_eq!(correlator.state_size().user_entries, 0);
        assert_eq!(correlator.state_size().dict_entries, 0);
    }

    #[tokio::test]
    async fn token_augmentation_merges_into_existing_user_state() {
        let correlator = Correlator::new(Duration::from_secs(300), 0);
        let remote = "10.0.0.1:1094";
        correlator.process_packet(&login(9, "carol.1:2@client.example.org\n&p=gsi"), remote);

        correlator.process_packet(
            &ParsedPacket::User {
                header: header(),
                kind: UserRecordKind::Token,
                dict_id: 200,
                raw: "carol.1:2@client.example.org\n&Uc=9&s=sub999&n=carol&o=OSG".to_string(),
            },
            remote,
        );

        let closes = correlator.process_packet(
            &file_stream(vec![
                FileSubRecord::Open {
                    file_id: 1,
                    rec_flag: 0,
                    user_id: Some(9),
                    file_size: 10,
                    lfn: "/store/a".to_string(),
                },
                FileSubRecord::Close {
                    file_id: 1,
                    rec_flag: 0,
                    read: 0,
                    readv: 0,
                    write: 0,
                    ops: None,
                },
            ]),
            remote,
        );

        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].token_subject.as_deref(), Some("sub999"));
    }

    #[tokio::test]
    async fn gstream_events_are_enriched_with_sid_and_from() {
        let correlator = Correlator::new(Duration::from_secs(300), 0);
        let packet = ParsedPacket::GStream {
            header: header(),
            begin: 0,
            end: 0,
            ident: 0,
            stream_type: xrm_types::GStreamType::Cache,
            events: vec![serde_json::json!({"op": "pfc_open"})],
        };
        let enriched = correlator.process_gstream_packet(&packet, "10.0.0.9:1094");
        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched[0]["server_ip"], "10.0.0.9");
        assert_eq!(enriched[0]["from"], "10.0.0.9:1094");
        assert_eq!(enriched[0]["sid"], "1000#10.0.0.9:1094");
    }
}
