use chrono::NaiveDateTime;
use tracing::{debug, warn};

use soil_forecast::{parse_line, ReadingBuffer};

use crate::state::SharedState;

/// Subscription filter covering every node's telemetry.
pub(crate) const TELEMETRY_FILTER: &str = "tele/+/reading";

// ---------------------------------------------------------------------------
// Topic / payload helpers
// ---------------------------------------------------------------------------

/// Extract node_id from "tele/<node_id>/reading".
pub(crate) fn extract_node_id(topic: &str) -> Option<&str> {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() == 3 && parts[0] == "tele" && parts[2] == "reading" && !parts[1].is_empty() {
        Some(parts[1])
    } else {
        None
    }
}

/// Topic carrying watering commands to `node_id`.
pub(crate) fn command_topic(node_id: &str) -> String {
    format!("cmd/{node_id}/water")
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// What happened to one incoming publish.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Ingest {
    Accepted,
    OtherNode,
    Rejected,
    Unhandled,
}

/// Parse a telemetry publish stamped at `received_at` and append it to the
/// buffer when it comes from `node_id`.
pub(crate) async fn handle_publish(
    topic: &str,
    payload: &[u8],
    node_id: &str,
    received_at: NaiveDateTime,
    buffer: &ReadingBuffer,
    shared: &SharedState,
) -> Ingest {
    let Some(source) = extract_node_id(topic) else {
        debug!(topic, "unhandled topic");
        return Ingest::Unhandled;
    };
    if source != node_id {
        debug!(node = %source, "ignoring reading from unconfigured node");
        return Ingest::OtherNode;
    }

    let line = String::from_utf8_lossy(payload);
    match parse_line(&line, received_at) {
        Ok(reading) => {
            debug!(
                node = %source,
                moisture = format!("{:.1}", reading.soil_moisture),
                "telemetry"
            );
            buffer.push(reading.clone());
            let buffered = buffer.len();
            shared.write().await.record_reading(reading, buffered);
            Ingest::Accepted
        }
        Err(e) => {
            warn!(node = %source, "bad telemetry: {e}");
            shared.write().await.record_error(format!("{source}: {e}"));
            Ingest::Rejected
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{EventKind, SystemState};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    fn test_shared() -> SharedState {
        Arc::new(RwLock::new(SystemState::new("node-a")))
    }

    fn ts() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-06-01 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    // -- extract_node_id ----------------------------------------------------

    #[test]
    fn extract_node_id_valid_topic() {
        assert_eq!(extract_node_id("tele/node-a/reading"), Some("node-a"));
    }

    #[test]
    fn extract_node_id_different_node() {
        assert_eq!(
            extract_node_id("tele/greenhouse-1/reading"),
            Some("greenhouse-1")
        );
    }

    #[test]
    fn extract_node_id_wrong_prefix() {
        assert_eq!(extract_node_id("foo/node-a/reading"), None);
    }

    #[test]
    fn extract_node_id_wrong_suffix() {
        assert_eq!(extract_node_id("tele/node-a/status"), None);
    }

    #[test]
    fn extract_node_id_too_few_segments() {
        assert_eq!(extract_node_id("tele/reading"), None);
    }

    #[test]
    fn extract_node_id_too_many_segments() {
        assert_eq!(extract_node_id("tele/node-a/sub/reading"), None);
    }

    #[test]
    fn extract_node_id_empty_node() {
        assert_eq!(extract_node_id("tele//reading"), None);
        assert_eq!(extract_node_id(""), None);
    }

    // -- command_topic ------------------------------------------------------

    #[test]
    fn command_topic_format() {
        assert_eq!(command_topic("node-a"), "cmd/node-a/water");
    }

    // -- handle_publish -----------------------------------------------------

    #[tokio::test]
    async fn accepted_reading_is_buffered_and_stamped() {
        let buffer = ReadingBuffer::new();
        let shared = test_shared();

        let outcome = handle_publish(
            "tele/node-a/reading",
            b"SOIL_UP:44.0,SOIL_LOW:40.0,TEMP:23.5,HUMID:61.0\n",
            "node-a",
            ts(),
            &buffer,
            &shared,
        )
        .await;

        assert_eq!(outcome, Ingest::Accepted);
        let latest = buffer.latest().unwrap();
        assert_eq!(latest.timestamp, ts());
        assert_eq!(latest.soil_moisture, 42.0);

        let st = shared.read().await;
        assert_eq!(st.buffered_readings, 1);
        assert_eq!(st.events[0].kind, EventKind::Reading);
    }

    #[tokio::test]
    async fn other_node_is_ignored() {
        let buffer = ReadingBuffer::new();
        let shared = test_shared();

        let outcome = handle_publish(
            "tele/node-b/reading",
            b"SOIL_UP:44.0,SOIL_LOW:40.0,TEMP:23.5,HUMID:61.0",
            "node-a",
            ts(),
            &buffer,
            &shared,
        )
        .await;

        assert_eq!(outcome, Ingest::OtherNode);
        assert!(buffer.is_empty());
        assert!(shared.read().await.events.is_empty());
    }

    #[tokio::test]
    async fn malformed_line_is_recorded_as_error() {
        let buffer = ReadingBuffer::new();
        let shared = test_shared();

        let outcome = handle_publish(
            "tele/node-a/reading",
            b"SOIL_UP:abc,TEMP:20",
            "node-a",
            ts(),
            &buffer,
            &shared,
        )
        .await;

        assert_eq!(outcome, Ingest::Rejected);
        assert!(buffer.is_empty());
        let st = shared.read().await;
        assert_eq!(st.events[0].kind, EventKind::Error);
        assert!(st.events[0].detail.starts_with("node-a: malformed reading"));
    }

    #[tokio::test]
    async fn unrelated_topic_is_unhandled() {
        let buffer = ReadingBuffer::new();
        let shared = test_shared();
        let outcome =
            handle_publish("cmd/node-a/water", b"WATER_ON:5", "node-a", ts(), &buffer, &shared)
                .await;
        assert_eq!(outcome, Ingest::Unhandled);
        assert!(buffer.is_empty());
    }
}
