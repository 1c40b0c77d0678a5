//! Binary XRootD monitoring wire-format decoder.

use xrm_types::{CloseOpsStats, FileSubRecord, GStreamType, Header, MapRecordKind, ParsedPacket, UserRecordKind};

use crate::error::ParseError;

const MIN_SUB_RECORD_SIZE: usize = 8;
const MAX_SUB_RECORD_SIZE: usize = 16384;

/// Decode one UDP datagram into its [`ParsedPacket`] shape.
pub fn decode_packet(buf: &[u8]) -> Result<ParsedPacket, ParseError> {
    if buf.is_empty() {
        return Err(ParseError::TooShort {
            detail: "empty datagram".to_string(),
        });
    }
    if buf[0] == b'<' {
        return Ok(ParsedPacket::XmlSummary(buf.to_vec()));
    }
    if buf[0] == b'{' {
        return Ok(ParsedPacket::JsonLiteral(buf.to_vec()));
    }
    if buf.len() < Header::SIZE {
        return Err(ParseError::TooShort {
            detail: format!("{} bytes, need at least {}", buf.len(), Header::SIZE),
        });
    }
    let header = Header::decode(buf).expect("length already checked");
    if header.len as usize != buf.len() {
        return Err(ParseError::LengthMismatch {
            detail: format!("header.len={} actual={}", header.len, buf.len()),
        });
    }

    let payload = &buf[Header::SIZE..];
    match header.type_code {
        b'=' => decode_map(header, MapRecordKind::ServerIdent, payload),
        b'd' => decode_map(header, MapRecordKind::PathDict, payload),
        b'i' => decode_map(header, MapRecordKind::AppInfo, payload),
        b'U' => decode_map(header, MapRecordKind::ExtendedActivity, payload),
        b'u' => decode_user(header, UserRecordKind::Login, payload),
        b'T' => decode_user(header, UserRecordKind::Token, payload),
        b'f' => {
            let records = decode_file_records(payload);
            Ok(ParsedPacket::FileStream { header, records })
        }
        b't' => {
            let records = decode_file_records(payload);
            Ok(ParsedPacket::TraceStream { header, records })
        }
        b'g' => decode_gstream(header, payload),
        b'r' | b'p' | b'x' => Ok(ParsedPacket::Passthrough {
            header,
            code: header.type_code,
        }),
        other => Err(ParseError::UnknownType {
            code: other,
            detail: format!("unrecognized packet type byte {other:#04x}"),
        }),
    }
}

fn decode_map(header: Header, kind: MapRecordKind, payload: &[u8]) -> Result<ParsedPacket, ParseError> {
    let (dict_id, raw) = decode_dict_id_and_text(payload)?;
    Ok(ParsedPacket::Map { header, kind, dict_id, raw })
}

fn decode_user(header: Header, kind: UserRecordKind, payload: &[u8]) -> Result<ParsedPacket, ParseError> {
    let (dict_id, raw) = decode_dict_id_and_text(payload)?;
    Ok(ParsedPacket::User { header, kind, dict_id, raw })
}

fn decode_dict_id_and_text(payload: &[u8]) -> Result<(u32, String), ParseError> {
    if payload.len() < 4 {
        return Err(ParseError::DecodeFailure {
            detail: format!("map payload too short for dictId: {} bytes", payload.len()),
        });
    }
    let dict_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let text_bytes = &payload[4..];
    let trimmed = trim_trailing_nul(text_bytes);
    let text = String::from_utf8_lossy(trimmed).into_owned();
    Ok((dict_id, text))
}

fn trim_trailing_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Decode the sequence of 8-byte-prefixed sub-records in an `f` or `t`
/// packet. The leading `FileTOD` in an `f` packet is simply a Time-type
/// sub-record: no special casing is needed beyond the generic dispatch.
fn decode_file_records(payload: &[u8]) -> Vec<FileSubRecord> {
    let mut records = Vec::new();
    let mut offset = 0usize;

    while offset + MIN_SUB_RECORD_SIZE <= payload.len() {
        let rec_type = payload[offset];
        let rec_flag = payload[offset + 1];
        let rec_size = u16::from_be_bytes([payload[offset + 2], payload[offset + 3]]) as usize;
        let file_id = u32::from_be_bytes([
            payload[offset + 4],
            payload[offset + 5],
            payload[offset + 6],
            payload[offset + 7],
        ]);

        if rec_size < MIN_SUB_RECORD_SIZE || rec_size > MAX_SUB_RECORD_SIZE {
            tracing::warn!(target: "relay.parser", rec_size, "invalid sub-record size, halting iteration");
            break;
        }
        if offset + rec_size > payload.len() {
            tracing::warn!(target: "relay.parser", rec_size, remaining = payload.len() - offset, "truncated sub-record, halting iteration");
            break;
        }

        let body = &payload[offset + MIN_SUB_RECORD_SIZE..offset + rec_size];
        match rec_type {
            1 => match decode_open(file_id, rec_flag, body) {
                Ok(rec) => records.push(rec),
                Err(_) => break,
            },
            0 => match decode_close(file_id, rec_flag, body) {
                Ok(rec) => records.push(rec),
                Err(_) => break,
            },
            2 => match decode_time(file_id, rec_flag, body) {
                Ok(rec) => records.push(rec),
                Err(_) => break,
            },
            // Disc sub-records are 8 bytes only: the common prefix slot that
            // holds `file_id` for every other sub-record type holds the
            // disconnecting userId here instead, and there is no body.
            4 => records.push(FileSubRecord::Disc {
                file_id: 0,
                rec_flag,
                user_id: file_id,
            }),
            _ => {
                tracing::warn!(target: "relay.parser", rec_type, "unknown sub-record type, halting iteration");
                break;
            }
        }

        offset += rec_size;
    }

    records
}

fn decode_open(file_id: u32, rec_flag: u8, body: &[u8]) -> Result<FileSubRecord, ()> {
    if body.len() < 8 {
        return Err(());
    }
    let file_size = u64::from_be_bytes(body[0..8].try_into().unwrap());
    let has_user_id = rec_flag & 0x1 != 0;
    let (user_id, lfn_bytes) = if has_user_id {
        if body.len() < 12 {
            return Err(());
        }
        (Some(u32::from_be_bytes(body[8..12].try_into().unwrap())), &body[12..])
    } else {
        (None, &body[8..])
    };
    let lfn = String::from_utf8_lossy(trim_trailing_nul(lfn_bytes)).into_owned();
    Ok(FileSubRecord::Open {
        file_id,
        rec_flag,
        user_id,
        file_size,
        lfn,
    })
}

fn decode_close(file_id: u32, rec_flag: u8, body: &[u8]) -> Result<FileSubRecord, ()> {
    if body.len() < 24 {
        return Err(());
    }
    let read = u64::from_be_bytes(body[0..8].try_into().unwrap());
    let readv = u64::from_be_bytes(body[8..16].try_into().unwrap());
    let write = u64::from_be_bytes(body[16..24].try_into().unwrap());
    let has_ops = rec_flag & 0x2 != 0;
    let ops = if has_ops {
        if body.len() < 24 + CloseOpsStats::ENCODED_SIZE {
            return Err(());
        }
        Some(decode_ops_stats(&body[24..24 + CloseOpsStats::ENCODED_SIZE]))
    } else {
        None
    };
    Ok(FileSubRecord::Close {
        file_id,
        rec_flag,
        read,
        readv,
        write,
        ops,
    })
}

fn decode_ops_stats(body: &[u8]) -> CloseOpsStats {
    let mut fields = [0u32; 12];
    for (i, field) in fields.iter_mut().enumerate() {
        let start = i * 4;
        *field = u32::from_be_bytes(body[start..start + 4].try_into().unwrap());
    }
    CloseOpsStats {
        read_ops: fields[0],
        read_min: fields[1],
        read_max: fields[2],
        readv_ops: fields[3],
        readv_min: fields[4],
        readv_max: fields[5],
        rsegs: fields[6],
        rsegs_min: fields[7],
        rsegs_max: fields[8],
        write_ops: fields[9],
        write_min: fields[10],
        write_max: fields[11],
    }
}

fn decode_time(file_id: u32, rec_flag: u8, body: &[u8]) -> Result<FileSubRecord, ()> {
    if body.len() < 20 {
        return Err(());
    }
    let nrecs0 = u16::from_be_bytes(body[0..2].try_into().unwrap());
    let nrecs1 = u16::from_be_bytes(body[2..4].try_into().unwrap());
    let t_beg = u32::from_be_bytes(body[4..8].try_into().unwrap());
    let t_end = u32::from_be_bytes(body[8..12].try_into().unwrap());
    let sid = u64::from_be_bytes(body[12..20].try_into().unwrap());
    Ok(FileSubRecord::Time {
        file_id,
        rec_flag,
        nrecs0,
        nrecs1,
        t_beg,
        t_end,
        sid,
    })
}

fn decode_gstream(header: Header, payload: &[u8]) -> Result<ParsedPacket, ParseError> {
    if payload.len() < 16 {
        return Err(ParseError::DecodeFailure {
            detail: format!("g-stream payload too short: {} bytes", payload.len()),
        });
    }
    let begin = u32::from_be_bytes(payload[0..4].try_into().unwrap());
    let end = u32::from_be_bytes(payload[4..8].try_into().unwrap());
    let ident = u64::from_be_bytes(payload[8..16].try_into().unwrap());
    let stream_type = GStreamType::from_byte((ident >> 56) as u8);

    let body = String::from_utf8_lossy(trim_trailing_nul(&payload[16..])).into_owned();
    let mut events = Vec::new();
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str(line) {
            Ok(value) => events.push(value),
            Err(e) => {
                tracing::warn!(target: "relay.parser", error = %e, "skipping malformed g-stream event");
            }
        }
    }

    Ok(ParsedPacket::GStream {
        header,
        begin,
        end,
        ident,
        stream_type,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(type_code: u8, sequence: u8, len: u16, server_start: i32) -> Vec<u8> {
        let mut buf = vec![type_code, sequence];
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&server_start.to_be_bytes());
        buf
    }

    #[test]
    fn xml_summary_is_flagged_and_returned_unmodified() {
        let buf = b"<statistics/>".to_vec();
        let packet = decode_packet(&buf).unwrap();
        assert_eq!(packet, ParsedPacket::XmlSummary(buf));
    }

    #[test]
    fn json_literal_is_flagged_and_returned_unmodified() {
        let buf = br#"{"k":"v"}"#.to_vec();
        let packet = decode_packet(&buf).unwrap();
        assert_eq!(packet, ParsedPacket::JsonLiteral(buf));
    }

    #[test]
    fn too_short_buffer_fails() {
        let buf = vec![b'=', 0, 0, 1];
        assert!(matches!(decode_packet(&buf), Err(ParseError::TooShort { .. })));
    }

    #[test]
    fn length_mismatch_fails() {
        let mut buf = header_bytes(b'=', 0, 99, 1000);
        buf.extend_from_slice(&[0u8; 4]);
        assert!(matches!(decode_packet(&buf), Err(ParseError::LengthMismatch { .. })));
    }

    #[test]
    fn unknown_type_fails() {
        let mut buf = header_bytes(b'?', 0, 8, 1000);
        buf.truncate(8);
        buf[2..4].copy_from_slice(&8u16.to_be_bytes());
        assert!(matches!(decode_packet(&buf), Err(ParseError::UnknownType { .. })));
    }

    #[test]
    fn decodes_server_ident_map_packet() {
        let text = b"&site=T2_US&port=1094&inst=xrootd&pgm=xrootd&ver=5.6.0";
        let mut buf = Vec::new();
        buf.extend_from_slice(&[0u8; 8]); // placeholder header
        buf.extend_from_slice(&100u32.to_be_bytes());
        buf.extend_from_slice(text);
        let len = buf.len() as u16;
        buf[0..8].copy_from_slice(&header_bytes(b'=', 1, len, 1000));

        let packet = decode_packet(&buf).unwrap();
        match packet {
            ParsedPacket::Map { kind, dict_id, raw, .. } => {
                assert_eq!(kind, MapRecordKind::ServerIdent);
                assert_eq!(dict_id, 100);
                assert!(raw.contains("site=T2_US"));
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    fn file_open_body(lfn: &str, user_id: Option<u32>) -> (u8, Vec<u8>) {
        let mut body = Vec::new();
        body.extend_from_slice(&1024u64.to_be_bytes());
        let mut rec_flag = 0u8;
        if let Some(uid) = user_id {
            rec_flag |= 0x1;
            body.extend_from_slice(&uid.to_be_bytes());
        }
        body.extend_from_slice(lfn.as_bytes());
        (rec_flag, body)
    }

    fn sub_record(rec_type: u8, rec_flag: u8, file_id: u32, body: &[u8]) -> Vec<u8> {
        let rec_size = (8 + body.len()) as u16;
        let mut buf = vec![rec_type, rec_flag];
        buf.extend_from_slice(&rec_size.to_be_bytes());
        buf.extend_from_slice(&file_id.to_be_bytes());
        buf.extend_from_slice(body);
        buf
    }

    #[test]
    fn decodes_file_stream_open_record() {
        let (rec_flag, body) = file_open_body("/data/t.txt", Some(456));
        let sub = sub_record(1, rec_flag, 123, &body);

        let mut buf = vec![0u8; 8];
        buf.extend_from_slice(&sub);
        let len = buf.len() as u16;
        buf[0..8].copy_from_slice(&header_bytes(b'f', 0, len, 1000));

        let packet = decode_packet(&buf).unwrap();
        match packet {
            ParsedPacket::FileStream { records, .. } => {
                assert_eq!(records.len(), 1);
                match &records[0] {
                    FileSubRecord::Open { file_id, user_id, file_size, lfn, .. } => {
                        assert_eq!(*file_id, 123);
                        assert_eq!(*user_id, Some(456));
                        assert_eq!(*file_size, 1024);
                        assert_eq!(lfn, "/data/t.txt");
                    }
                    other => panic!("unexpected sub-record {other:?}"),
                }
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn invalid_sub_record_size_halts_without_discarding_prior() {
        let (rec_flag, body) = file_open_body("/a", None);
        let good = sub_record(1, rec_flag, 1, &body);
        let mut bad = vec![0u8, 0, 0, 2, 0, 0, 0, 2]; // rec_size=2, too small
        bad.extend_from_slice(&[0u8; 4]);

        let mut buf = vec![0u8; 8];
        buf.extend_from_slice(&good);
        buf.extend_from_slice(&bad);
        let len = buf.len() as u16;
        buf[0..8].copy_from_slice(&header_bytes(b'f', 0, len, 1000));

        let packet = decode_packet(&buf).unwrap();
        match packet {
            ParsedPacket::FileStream { records, .. } => assert_eq!(records.len(), 1),
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn decodes_disc_record() {
        // Disc sub-records are 8 bytes: no body follows the common prefix.
        let sub = sub_record(4, 0, 77, &[]);
        let mut buf = vec![0u8; 8];
        buf.extend_from_slice(&sub);
        let len = buf.len() as u16;
        buf[0..8].copy_from_slice(&header_bytes(b'f', 0, len, 1000));

        let packet = decode_packet(&buf).unwrap();
        match packet {
            ParsedPacket::FileStream { records, .. } => match &records[0] {
                FileSubRecord::Disc { user_id, .. } => {
                    assert_eq!(*user_id, 77);
                }
                other => panic!("unexpected sub-record {other:?}"),
            },
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn decodes_gstream_cache_events() {
        let mut ident = 0u64;
        ident |= (b'C' as u64) << 56;
        let mut buf = vec![0u8; 8];
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&2u32.to_be_bytes());
        buf.extend_from_slice(&ident.to_be_bytes());
        buf.extend_from_slice(br#"{"a":1}"#);
        buf.push(b'\n');
        buf.extend_from_slice(br#"{"a":2}"#);
        let len = buf.len() as u16;
        buf[0..8].copy_from_slice(&header_bytes(b'g', 0, len, 1000));

        let packet = decode_packet(&buf).unwrap();
        match packet {
            ParsedPacket::GStream { stream_type, events, .. } => {
                assert_eq!(stream_type, GStreamType::Cache);
                assert_eq!(events.len(), 2);
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn passthrough_recognizes_redirect_purge_transfer() {
        for code in [b'r', b'p', b'x'] {
            let buf = header_bytes(code, 0, 8, 1000);
            let packet = decode_packet(&buf).unwrap();
            assert!(matches!(packet, ParsedPacket::Passthrough { code: c, .. } if c == code));
        }
    }
}
