//! Connection watchdog: periodically probes the chat API and asks the runner
//! to rebuild the dispatcher when the connection drops.

use crate::bot::transport::ChatTransport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Shared connection liveness flag
#[derive(Debug)]
pub struct Liveness {
    alive: AtomicBool,
}

impl Default for Liveness {
    fn default() -> Self {
        Self {
            alive: AtomicBool::new(true),
        }
    }
}

/// Result of one probe compared with the previous state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    /// Up before and after
    Healthy,
    /// Just went down
    Lost,
    /// Down before and still down
    StillDown,
    /// Just came back
    Restored,
}

impl Liveness {
    /// Starts out alive
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last observed state
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Records a probe result and reports the transition
    pub fn observe(&self, reachable: bool) -> HealthTransition {
        let was_alive = self.alive.swap(reachable, Ordering::SeqCst);
        match (was_alive, reachable) {
            (true, true) => HealthTransition::Healthy,
            (true, false) => HealthTransition::Lost,
            (false, false) => HealthTransition::StillDown,
            (false, true) => HealthTransition::Restored,
        }
    }
}

/// Probes `transport` every `interval` until `cancel` fires.
///
/// On a lost connection `restart` is notified once; the runner reacts by
/// shutting the dispatcher down and building a new one.
pub async fn run_watchdog(
    transport: Arc<dyn ChatTransport>,
    liveness: Arc<Liveness>,
    restart: Arc<Notify>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("Watchdog stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        let probe = transport.health_check().await;
        match liveness.observe(probe.is_ok()) {
            HealthTransition::Healthy | HealthTransition::StillDown => {}
            HealthTransition::Lost => {
                if let Err(e) = probe {
                    error!("Connection lost: {e}. Requesting dispatcher restart...");
                }
                restart.notify_one();
            }
            HealthTransition::Restored => info!("Connection reestablished."),
        }
    }
}
