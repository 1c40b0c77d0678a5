//! Construction of the emitted [`CollectorRecord`] from a closed file's
//! context, close statistics, and resolved user/token state.

use xrm_types::{CloseOpsStats, CollectorRecord, OpStats, ServerId, ServerInfo, UserState};

use crate::enrichment::{derive_user_domain, UserLookup};

/// What is known about the file being closed, whether from a matched
/// `FileState` or synthesized for a standalone close.
#[derive(Debug, Clone)]
pub struct FileContext {
    pub filename: String,
    pub open_time: i64,
    pub file_size: u64,
}

/// The close sub-record's own fields.
#[derive(Debug, Clone)]
pub struct CloseFields {
    pub read: u64,
    pub readv: u64,
    pub write: u64,
    pub ops: Option<CloseOpsStats>,
    pub end_time: i64,
}

fn op_stats(total_bytes: u64, ops: u32, min: u32, max: u32) -> OpStats {
    OpStats {
        min,
        max,
        average: if ops > 0 { total_bytes as f64 / f64::from(ops) } else { 0.0 },
    }
}

/// Extract the bare IP from a `ServerId`'s `"{serverStart}#{host}:{port}"`
/// form.
pub(crate) fn server_ip_from_id(server_id: &str) -> String {
    let Some((_, host_port)) = server_id.split_once('#') else {
        return String::new();
    };
    match host_port.rsplit_once(':') {
        Some((host, _port)) => host.trim_start_matches('[').trim_end_matches(']').to_string(),
        None => host_port.to_string(),
    }
}

/// Build a complete collector record from a closed file's context, close
/// statistics, and resolved user/token state. Used for both a normally
/// correlated close (matched `FileState`) and a standalone close (no
/// matching `FileState`, fields defaulted).
#[must_use]
pub fn build_record(
    timestamp: i64,
    server: &ServerId,
    server_info: &ServerInfo,
    ctx: &FileContext,
    close: &CloseFields,
    user_lookup: &UserLookup,
    user_state: Option<&UserState>,
) -> CollectorRecord {
    let (user, host, protocol) = match user_lookup {
        UserLookup::Known(info) => (info.user.clone(), info.host.clone(), info.protocol.clone().unwrap_or_default()),
        UserLookup::Fallback(hex) => (hex.clone(), String::new(), String::new()),
    };

    let auth_info = user_state.and_then(|s| s.auth_info.as_ref());
    let token_info = user_state.and_then(|s| s.token_info.as_ref());

    let user_dn = auth_info.and_then(|a| a.dn_prefix()).unwrap_or_default().to_string();
    let user_domain = if host.is_empty() { None } else { derive_user_domain(&host) };
    let vo = token_info
        .and_then(|t| t.organization.clone())
        .or_else(|| auth_info.and_then(|a| a.organization.clone()));
    let ipv6 = auth_info.and_then(|a| a.inet_version.as_deref()) == Some("6");
    let appinfo = user_state.and_then(|s| s.app_info.clone()).unwrap_or_default();

    let ops = close.ops.unwrap_or_default();
    let read_stats = op_stats(close.read, ops.read_ops, ops.read_min, ops.read_max);
    let readv_stats = op_stats(close.readv, ops.readv_ops, ops.readv_min, ops.readv_max);
    let write_stats = op_stats(close.write, ops.write_ops, ops.write_min, ops.write_max);
    let readv_segment_stats = OpStats {
        min: ops.rsegs_min,
        max: ops.rsegs_max,
        average: if ops.readv_ops > 0 { f64::from(ops.rsegs) / f64::from(ops.readv_ops) } else { 0.0 },
    };

    let (dirname1, dirname2, logical_dirname) = crate::dirtable::derive_dir_fields(&ctx.filename);

    let server_id = server.as_str().to_string();
    let server_ip = server_ip_from_id(&server_id);

    CollectorRecord {
        timestamp,
        server_id,
        server_hostname: server_info.host.clone(),
        server: server_info.instance.clone(),
        server_ip,
        site: server_info.site.clone(),

        user,
        user_dn,
        user_domain,
        vo,
        host,
        protocol,
        appinfo,
        ipv6,

        token_subject: token_info.and_then(|t| t.subject.clone()),
        token_username: token_info.and_then(|t| t.username.clone()),
        token_org: token_info.and_then(|t| t.organization.clone()),
        token_role: token_info.and_then(|t| t.role.clone()),
        token_groups: token_info.map(|t| t.groups.clone()).filter(|g| !g.is_empty()),

        filename: ctx.filename.clone(),
        dirname1,
        dirname2,
        logical_dirname,
        filesize: ctx.file_size,
        start_time: ctx.open_time,
        end_time: close.end_time,
        operation_time: close.end_time - ctx.open_time,

        read: close.read,
        readv: close.readv,
        write: close.write,
        read_single_bytes: close.read,
        read_bytes_at_close: close.read,
        write_bytes_at_close: close.write,

        read_operations: ops.read_ops,
        read_single_operations: ops.read_ops,
        read_vector_operations: ops.readv_ops,
        write_operations: ops.write_ops,
        read_stats,
        read_single_stats: read_stats,
        read_vector_stats: readv_stats,
        write_stats,
        readv_segment_stats,

        has_file_close_msg: 1,
    }
}
