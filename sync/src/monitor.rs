//! Online status monitoring.
//!
//! The monitor keeps one boolean reachability flag, seeded from the
//! platform's connectivity signal and corrected by periodic liveness
//! probes against the remote endpoint (platforms happily report "online"
//! while the actual endpoint is unreachable). Observers get exactly one
//! notification per transition; repeated identical readings are dropped.

use crate::remote::RemoteEndpoint;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Tracks and broadcasts remote reachability.
#[derive(Debug, Clone)]
pub struct OnlineMonitor {
    tx: watch::Sender<bool>,
}

impl OnlineMonitor {
    /// Create a monitor seeded with the platform's current reading.
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx }
    }

    /// Current reachability flag.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Watch for transitions. The receiver sees each state change once.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Feed a connectivity reading (platform signal or probe result).
    /// Returns `true` if this was a transition, `false` if it duplicated
    /// the current state and was dropped.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            if online {
                tracing::info!("connectivity restored");
            } else {
                tracing::info!("connectivity lost");
            }
        }
        changed
    }

    /// Probe the remote on an interval, correcting stale readings. Runs
    /// until the task is dropped.
    pub async fn probe_loop<R>(&self, remote: Arc<R>, interval: Duration)
    where
        R: RemoteEndpoint + ?Sized,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let reachable = remote.probe().await;
            if self.set_online(reachable) {
                tracing::debug!(reachable, "probe corrected connectivity state");
            }
        }
    }
}
