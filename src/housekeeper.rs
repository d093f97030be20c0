/// Expiry Housekeeper
///
/// Periodic deletion of expired refresh-token records.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{Instrument, Span};

use crate::storage::RefreshTokenStore;

/// Sweep cadence used in production.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Shorter intervals are raised to this.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub struct Housekeeper;

impl Housekeeper {
    /// Start the sweep loop on the current tokio runtime.
    ///
    /// The first sweep happens one `interval` after start. A failed sweep is
    /// logged and retried on the next tick. An interval below
    /// `MIN_SWEEP_INTERVAL` is raised to it.
    pub fn spawn<S>(store: Arc<S>, interval: Duration, span: Span) -> HousekeeperHandle
    where
        S: RefreshTokenStore + ?Sized + 'static,
    {
        if interval < MIN_SWEEP_INTERVAL {
            span.in_scope(|| {
                tracing::warn!(
                    requested_ms = interval.as_millis() as u64,
                    "Sweep interval too short, using the minimum"
                )
            });
        }
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(
            async move {
                let mut ticker = time::interval_at(Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                tracing::info!(interval_secs = interval.as_secs(), "Expiry housekeeper started");

                loop {
                    tokio::select! {
                        _ = ticker.tick() => sweep(&*store).await,
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }

                tracing::info!("Expiry housekeeper stopped");
            }
            .instrument(span),
        );

        HousekeeperHandle { shutdown, task }
    }
}

/// Delete expired records once. Errors are logged, never returned.
pub async fn sweep<S: RefreshTokenStore + ?Sized>(store: &S) {
    match store.delete_expired_tokens(Utc::now()).await {
        Ok(0) => tracing::debug!("No expired refresh tokens"),
        Ok(deleted) => tracing::info!(deleted, "Deleted expired refresh tokens"),
        Err(e) => tracing::error!(error = %e, "Failed to delete expired refresh tokens"),
    }
}

pub struct HousekeeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HousekeeperHandle {
    /// Ask the loop to stop and wait for it. A sweep in progress finishes
    /// first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Expiry housekeeper task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
