//! Liveness probing for live handles.
//!
//! Each registered handle gets its own probe task. Probes are WebSocket ping
//! control frames and never reach the relays; acks are pong control frames
//! (or a JSON `ping` from the client).

use super::ConnectionHandle;
use crate::metrics;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy)]
pub struct HeartbeatMonitor {
    interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start probing `handle`.
    ///
    /// On every tick the previous probe must have been answered; otherwise the
    /// handle is closed and `on_dead` runs once. The task also ends quietly
    /// when the handle closes for any other reason.
    pub fn watch<F, Fut>(&self, handle: ConnectionHandle, on_dead: F) -> JoinHandle<()>
    where
        F: FnOnce(ConnectionHandle) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = self.interval;
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !handle.is_alive() {
                    break;
                }

                if handle.awaiting_heartbeat() {
                    tracing::warn!(
                        connection_id = %handle.id(),
                        user_id = ?handle.user_id(),
                        "heartbeat missed, reaping connection"
                    );
                    metrics::HEARTBEAT_REAPED_TOTAL.inc();
                    handle.close();
                    on_dead(handle).await;
                    break;
                }

                if handle.probe().is_err() {
                    break;
                }
            }
        })
    }
}
