//! Periodic liveness probing.

use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::{Caller, ClientEvent};

/// Probe method name. The server registers the misspelled form; sending
/// the corrected spelling gets no response.
const HEARTBEAT_METHOD: &str = "heatbeat";

/// Heartbeat timing.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// Time between probes.
    pub interval: Duration,
    /// Deadline for each probe. Much tighter than the call default: a
    /// probe that takes longer than this is already bad news.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(3),
        }
    }
}

/// Probes the server on a fixed interval for as long as it lives.
///
/// A failed probe is reported as [`ClientEvent::HeartbeatFailed`] and
/// probing continues; the monitor never closes the connection. Dropping
/// the monitor stops probing.
pub struct HeartbeatMonitor {
    task: JoinHandle<()>,
}

impl HeartbeatMonitor {
    /// Starts probing through `caller`, reporting failures on `events`.
    pub fn start<C>(
        caller: C,
        config: HeartbeatConfig,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self
    where
        C: Caller + 'static,
    {
        let task = tokio::spawn(run(caller, config, events));
        Self { task }
    }

    /// Stops probing.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<C: Caller>(
    caller: C,
    config: HeartbeatConfig,
    events: broadcast::Sender<ClientEvent>,
) {
    // First probe reports 0, matching the gateway's expected sequence.
    let mut counter: u64 = 0;
    loop {
        tokio::time::sleep(config.interval).await;
        let args = json!({ "no_operation_counter": counter });
        match caller
            .call_with_timeout(HEARTBEAT_METHOD, args, config.timeout)
            .await
        {
            Ok(_) => {
                tracing::trace!(counter, "heartbeat ok");
            }
            Err(e) => {
                tracing::warn!(counter, error = %e, "heartbeat failed");
                let _ = events.send(ClientEvent::HeartbeatFailed {
                    detail: e.to_string(),
                });
            }
        }
        counter += 1;
    }
}
