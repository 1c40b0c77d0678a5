//! Wiring between UDP ingress, the validator/correlator stages, the
//! durable queue, and the publisher pool, in either shoveler or
//! collector mode.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use xrm_config::{AmqpConfig, MapConfig};
use xrm_correlator::Correlator;
use xrm_queue::DurableQueue;
use xrm_telemetry::Counters;
use xrm_types::{CollectorRecord, GStreamType, ParsedPacket, QueueMessage};
use xrm_validator::{IpMap, Packager, Validator};

/// Datagram read buffer size. XRootD monitoring packets are well under
/// this; it is sized generously so a single `recv_from` never truncates.
pub const READ_BUFFER_BYTES: usize = 1024 * 1024;

/// How often the queue-depth gauge and publisher reconnect counter are
/// refreshed from their source of truth.
pub const STATS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Build an [`IpMap`] from the configured rewrite table.
#[must_use]
pub fn ip_map_from_config(map: &MapConfig) -> IpMap {
    let mut ip_map = IpMap::new();
    if let Some(all) = &map.all {
        ip_map = ip_map.with_map_all(all.clone());
    }
    for (from, to) in &map.exact {
        ip_map = ip_map.with_entry(from.clone(), to.clone());
    }
    ip_map
}

/// The exchange a g-stream event's stream type routes to, falling back
/// to the default exchange for an unknown stream type or an unset
/// per-type override.
#[must_use]
pub fn gstream_exchange(stream_type: &GStreamType, amqp: &AmqpConfig) -> String {
    let configured = match stream_type {
        GStreamType::Cache => amqp.exchange_cache.as_ref(),
        GStreamType::Tcp => amqp.exchange_tcp.as_ref(),
        GStreamType::Tpc => amqp.exchange_tpc.as_ref(),
        GStreamType::Unknown(byte) => {
            tracing::warn!(target: "relay.daemon", stream_type = *byte as char, "unknown gstream type, routing to default exchange");
            None
        }
    };
    configured.cloned().unwrap_or_else(|| amqp.exchange.clone())
}

/// Serialize a collector record into a queue message bound for
/// `exchange`. The routing key is carried for observability only; the
/// publisher always sends an empty AMQP routing key.
pub fn record_message(record: &CollectorRecord, exchange: &str) -> Result<QueueMessage, serde_json::Error> {
    let bytes = serde_json::to_vec(record)?;
    Ok(QueueMessage::new(bytes, exchange, ""))
}

/// Serialize one enriched g-stream event into a queue message.
pub fn event_message(event: &Value, exchange: &str) -> Result<QueueMessage, serde_json::Error> {
    let bytes = serde_json::to_vec(event)?;
    Ok(QueueMessage::new(bytes, exchange, ""))
}

/// Shoveling-mode ingress: validate, package, enqueue. Minimal
/// processing, order-preserving.
pub async fn run_shoveler(
    socket: Arc<UdpSocket>,
    queue: Arc<DurableQueue>,
    default_exchange: String,
    ip_map: IpMap,
    verify: bool,
    counters: Counters,
    cancel: CancellationToken,
) {
    let validator = Validator::with_verify(verify);
    let packager = Packager::new(env!("CARGO_PKG_VERSION"), ip_map);
    let mut buf = vec![0u8; READ_BUFFER_BYTES];

    loop {
        let (len, remote) = tokio::select! {
            _ = cancel.cancelled() => break,
            recv = socket.recv_from(&mut buf) => match recv {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(target: "relay.daemon", error = %err, "udp recv failed");
                    continue;
                }
            },
        };

        match validator.validate(&buf[..len]) {
            Ok(validated) => {
                let envelope = packager.package(&buf[..len], &remote.ip().to_string(), remote.port());
                let msg = QueueMessage::new(envelope.into_bytes(), default_exchange.clone(), validated.routing_key().to_string());
                if let Err(err) = queue.enqueue(msg).await {
                    tracing::error!(target: "relay.daemon", error = %err, "failed to enqueue shoveled datagram");
                }
            }
            Err(err) => {
                counters.incr_validation_failures();
                tracing::warn!(target: "relay.daemon", error = %err, remote = %remote, "datagram failed validation");
            }
        }
    }
}

/// Collector-mode ingress: decode, correlate, enrich, enqueue.
pub async fn run_collector(
    socket: Arc<UdpSocket>,
    queue: Arc<DurableQueue>,
    correlator: Arc<Correlator>,
    amqp: AmqpConfig,
    counters: Counters,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; READ_BUFFER_BYTES];

    loop {
        let (len, remote) = tokio::select! {
            _ = cancel.cancelled() => break,
            recv = socket.recv_from(&mut buf) => match recv {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(target: "relay.daemon", error = %err, "udp recv failed");
                    continue;
                }
            },
        };

        let packet = match xrm_parser::decode_packet(&buf[..len]) {
            Ok(packet) => packet,
            Err(err) => {
                counters.incr_validation_failures();
                tracing::warn!(target: "relay.daemon", error = %err, remote = %remote, "datagram failed to decode");
                continue;
            }
        };

        let remote = remote.to_string();

        if let ParsedPacket::GStream { ref stream_type, .. } = packet {
            let exchange = gstream_exchange(stream_type, &amqp);
            let events = correlator.process_gstream_packet(&packet, &remote);
            counters.incr_records_emitted(events.len() as u64);
            for event in &events {
                match event_message(event, &exchange) {
                    Ok(msg) => {
                        if let Err(err) = queue.enqueue(msg).await {
                            tracing::error!(target: "relay.daemon", error = %err, "failed to enqueue gstream event");
                        }
                    }
                    Err(err) => tracing::error!(target: "relay.daemon", error = %err, "failed to serialize gstream event"),
                }
            }
            continue;
        }

        let records = correlator.process_packet(&packet, &remote);
        counters.incr_records_emitted(records.len() as u64);
        for record in &records {
            match record_message(record, &amqp.exchange) {
                Ok(msg) => {
                    if let Err(err) = queue.enqueue(msg).await {
                        tracing::error!(target: "relay.daemon", error = %err, "failed to enqueue collector record");
                    }
                }
                Err(err) => tracing::error!(target: "relay.daemon", error = %err, "failed to serialize collector record"),
            }
        }
    }
}

/// Periodically refresh the queue-depth gauge and fold publisher
/// reconnects into the shared [`Counters`]. Runs until cancelled.
pub async fn report_stats(
    queue: Arc<DurableQueue>,
    pool_stats: Arc<xrm_publisher::PoolStats>,
    counters: Counters,
    cancel: CancellationToken,
) {
    let mut last_reconnects = 0u64;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(STATS_POLL_INTERVAL) => {}
        }
        let depth = queue.size().await;
        counters.set_queue_depth(depth as i64);

        let reconnects = pool_stats.reconnects();
        if reconnects > last_reconnects {
            for _ in 0..(reconnects - last_reconnects) {
                counters.incr_reconnects();
            }
            last_reconnects = reconnects;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use xrm_config::AmqpConfig;

    fn amqp_with_gstream_exchanges() -> AmqpConfig {
        AmqpConfig {
            url: "amqp://broker/vhost".to_string(),
            exchange: "default.exchange".to_string(),
            exchange_cache: Some("cache.exchange".to_string()),
            exchange_tcp: Some("tcp.exchange".to_string()),
            exchange_tpc: None,
            token_location: None,
            publish_workers: 4,
        }
    }

    #[test]
    fn gstream_exchange_routes_known_types() {
        let amqp = amqp_with_gstream_exchanges();
        assert_eq!(gstream_exchange(&GStreamType::Cache, &amqp), "cache.exchange");
        assert_eq!(gstream_exchange(&GStreamType::Tcp, &amqp), "tcp.exchange");
    }

    #[test]
    fn gstream_exchange_falls_back_to_default_when_unset() {
        let amqp = amqp_with_gstream_exchanges();
        assert_eq!(gstream_exchange(&GStreamType::Tpc, &amqp), "default.exchange");
    }

    #[test]
    fn gstream_exchange_falls_back_to_default_for_unknown_type() {
        let amqp = amqp_with_gstream_exchanges();
        assert_eq!(gstream_exchange(&GStreamType::Unknown(b'X'), &amqp), "default.exchange");
    }

    #[test]
    fn event_message_carries_empty_routing_key() {
        let event = serde_json::json!({"a": 1});
        let msg = event_message(&event, "cache.exchange").unwrap();
        assert_eq!(msg.exchange, "cache.exchange");
        assert_eq!(msg.routing_key, "");
        assert_eq!(msg.bytes, serde_json::to_vec(&event).unwrap());
    }

    #[test]
    fn ip_map_from_config_prefers_map_all() {
        let mut exact = BTreeMap::new();
        exact.insert("1.2.3.4".to_string(), "5.6.7.8".to_string());
        let map = MapConfig {
            all: Some("9.9.9.9".to_string()),
            exact,
        };
        let ip_map = ip_map_from_config(&map);
        assert_eq!(ip_map.rewrite("1.2.3.4"), "9.9.9.9");
    }

    #[test]
    fn ip_map_from_config_applies_exact_entries_without_map_all() {
        let mut exact = BTreeMap::new();
        exact.insert("1.2.3.4".to_string(), "5.6.7.8".to_string());
        let map = MapConfig { all: None, exact };
        let ip_map = ip_map_from_config(&map);
        assert_eq!(ip_map.rewrite("1.2.3.4"), "5.6.7.8");
        assert_eq!(ip_map.rewrite("9.9.9.9"), "9.9.9.9");
    }
}
