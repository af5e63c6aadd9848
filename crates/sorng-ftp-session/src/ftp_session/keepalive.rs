//! Keep-alive timer.
//!
//! Fires slightly slower than the profile's NOOP interval and enqueues a
//! NoOp on the control queue when both connections have been quiet for
//! longer than that interval. The task never touches a client beyond
//! reading its idle counter.

use crate::ftp_session::host::NotificationSink;
use crate::ftp_session::operations::{OperationKind, QueueOperation};
use crate::ftp_session::queue::QueueHandle;
use crate::ftp_session::transport::TransportClient;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};

/// Slack added to the timer period so a tick does not land just before the
/// interval elapses.
const TICK_SLACK_MS: u64 = 500;

/// Upper bound on the timer period (one day).
const MAX_PERIOD_MS: u64 = 24 * 60 * 60 * 1000;

/// Tick bookkeeping and the send decision, kept apart from the task.
#[derive(Debug, Clone)]
pub struct KeepAliveMonitor {
    interval_secs: u64,
    ticks: u64,
}

impl KeepAliveMonitor {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval_secs,
            ticks: 0,
        }
    }

    pub fn period(&self) -> Duration {
        let ms = self
            .interval_secs
            .saturating_mul(1000)
            .saturating_add(TICK_SLACK_MS)
            .min(MAX_PERIOD_MS);
        Duration::from_millis(ms)
    }

    /// Record a tick and decide whether a NOOP is due.
    pub fn should_send(&mut self, main_idle_secs: u64, transfer_idle_secs: u64) -> bool {
        self.ticks += 1;
        if self.ticks == 1 {
            return false;
        }
        if main_idle_secs == 0 && transfer_idle_secs == 0 {
            log::debug!("keep-alive: neither connection has been used yet");
            return false;
        }
        let idle = main_idle_secs.min(transfer_idle_secs);
        log::debug!("keep-alive: {}s since last server action", idle);
        idle > self.interval_secs
    }
}

/// Spawn the timer task on `runtime`. Abort the returned handle to stop it.
pub fn spawn_keepalive(
    runtime: &Handle,
    mut monitor: KeepAliveMonitor,
    main: Arc<dyn TransportClient>,
    transfer: Arc<dyn TransportClient>,
    control: QueueHandle,
    sink: Arc<dyn NotificationSink>,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let mut ticker = time::interval(monitor.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let main_idle = main.seconds_since_last_action();
            let transfer_idle = transfer.seconds_since_last_action();
            if monitor.should_send(main_idle, transfer_idle) {
                log::debug!("keep-alive: queueing NOOP");
                control.add(QueueOperation::new(sink.clone(), OperationKind::NoOp));
            }
        }
    })
}
