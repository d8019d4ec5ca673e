//! Connector events.
//!
//! Events are fire-and-forget: a sink must never block or fail the call
//! that emits them.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Submitted,
    Retried,
    Failed,
    Succeeded,
    ShortCircuited,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectorEvent {
    pub kind: EventKind,
    pub request_id: Uuid,
    pub job_id: Option<String>,
    pub host: Option<String>,
    /// Attempts made so far (0 before the first attempt).
    pub attempt: u32,
    pub duration_ms: u64,
    /// "pending", "success" or an error kind.
    pub outcome: &'static str,
    pub error: Option<String>,
}

pub trait EventSink: Send + Sync + fmt::Debug {
    fn emit(&self, event: ConnectorEvent);
}

/// Writes events to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: ConnectorEvent) {
        match event.kind {
            EventKind::Submitted => tracing::debug!(
                request_id = %event.request_id,
                job_id = ?event.job_id,
                "Verification submitted to DP"
            ),
            EventKind::Retried => tracing::warn!(
                request_id = %event.request_id,
                host = ?event.host,
                attempt = event.attempt,
                outcome = event.outcome,
                error = ?event.error,
                "DP attempt failed, retrying"
            ),
            EventKind::Succeeded => tracing::info!(
                request_id = %event.request_id,
                job_id = ?event.job_id,
                host = ?event.host,
                attempts = event.attempt,
                duration_ms = event.duration_ms,
                "DP verification succeeded"
            ),
            EventKind::Failed => tracing::error!(
                request_id = %event.request_id,
                job_id = ?event.job_id,
                host = ?event.host,
                attempts = event.attempt,
                duration_ms = event.duration_ms,
                outcome = event.outcome,
                error = ?event.error,
                "DP verification failed"
            ),
            EventKind::ShortCircuited => tracing::warn!(
                request_id = %event.request_id,
                job_id = ?event.job_id,
                "DP call refused by open circuit"
            ),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: ConnectorEvent) {}
}

/// Forwards events to an unbounded channel, e.g. for an audit writer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ConnectorEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConnectorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ConnectorEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind) -> ConnectorEvent {
        ConnectorEvent {
            kind,
            request_id: Uuid::new_v4(),
            job_id: Some("job-1".into()),
            host: None,
            attempt: 0,
            duration_ms: 0,
            outcome: "pending",
            error: None,
        }
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(event(EventKind::Submitted));
        sink.emit(event(EventKind::Succeeded));

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Submitted);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Succeeded);
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(event(EventKind::Failed));
    }

    #[test]
    fn test_event_serializes_kind_in_snake_case() {
        let value = serde_json::to_value(event(EventKind::ShortCircuited)).unwrap();
        assert_eq!(value["kind"], "short_circuited");
    }
}
