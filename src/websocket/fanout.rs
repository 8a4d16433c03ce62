//! Delivery of one frame to many handles.
//!
//! Every push is independent: a stalled or closed handle costs at most the
//! send timeout and never prevents delivery to the others.

use super::ConnectionHandle;
use crate::error::DeliveryError;
use crate::metrics;
use futures::future::join_all;
use serde::Serialize;
use std::time::Duration;

/// Per-call delivery tally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub failed: usize,
}

impl FanoutReport {
    pub fn merge(&mut self, other: FanoutReport) {
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

/// Push `frame` to every handle concurrently.
pub async fn push_to_handles<T: Serialize>(
    handles: &[ConnectionHandle],
    frame: &T,
    send_timeout: Duration,
) -> FanoutReport {
    if handles.is_empty() {
        return FanoutReport::default();
    }

    let payload = match serde_json::to_string(frame) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize fan-out frame");
            record_failure(&DeliveryError::Serialization(e.to_string()));
            return FanoutReport {
                delivered: 0,
                failed: handles.len(),
            };
        }
    };

    let sends = handles.iter().map(|handle| {
        let payload = payload.clone();
        async move { (handle, handle.send_text(payload, send_timeout).await) }
    });

    let mut report = FanoutReport::default();
    for (handle, result) in join_all(sends).await {
        match result {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                tracing::debug!(
                    connection_id = %handle.id(),
                    user_id = ?handle.user_id(),
                    error = %e,
                    "delivery to handle failed"
                );
                record_failure(&e);
                report.failed += 1;
            }
        }
    }
    report
}

pub(crate) fn record_failure(error: &DeliveryError) {
    metrics::DELIVERY_FAILURES_TOTAL
        .with_label_values(&[error.reason()])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::OutboundFrame;

    #[tokio::test(start_paused = true)]
    async fn test_stalled_handle_does_not_block_others() {
        let (healthy, mut healthy_rx) = ConnectionHandle::open(4);
        let (stalled, _stalled_rx) = ConnectionHandle::open(1);
        let (closed, closed_rx) = ConnectionHandle::open(4);
        drop(closed_rx);

        // Fill the stalled queue so the next push has to wait.
        stalled
            .send_text("backlog".into(), Duration::from_millis(1))
            .await
            .unwrap();

        let report = push_to_handles(
            &[stalled, healthy, closed],
            &serde_json::json!({"type": "pong"}),
            Duration::from_millis(100),
        )
        .await;

        assert_eq!(report, FanoutReport { delivered: 1, failed: 2 });
        assert_eq!(
            healthy_rx.recv().await,
            Some(OutboundFrame::Text(r#"{"type":"pong"}"#.into()))
        );
    }

    #[tokio::test]
    async fn test_empty_handle_set_is_noop() {
        let report = push_to_handles(&[], &"x", Duration::from_millis(10)).await;
        assert_eq!(report, FanoutReport::default());
    }
}
