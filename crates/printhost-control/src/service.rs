//! Periodic tracker publication
//!
//! Owns the low-frequency side of a `StateTracker`: a tokio task that
//! ticks at the configured period, optionally polls a refresh source,
//! and publishes the snapshot. Shutdown is cooperative through a
//! `CancelToken`.

use std::sync::Arc;

use printhost_core::CancelToken;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::tracker::StateTracker;

/// Source polled before each periodic publication
///
/// An implementation typically requests fresh readings from the device.
/// Errors are logged and the loop continues; a dead transport shows up
/// as stale timestamps in the published snapshots, not as a crashed
/// monitor.
pub trait RefreshSource: Send + Sync {
    /// Pull fresh values into the tracker
    fn refresh(&self, tracker: &StateTracker) -> anyhow::Result<()>;
}

/// Background publication task around one tracker
pub struct TrackerService {
    tracker: Arc<StateTracker>,
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

impl TrackerService {
    /// Spawn the periodic loop on the current tokio runtime
    pub fn spawn(
        tracker: Arc<StateTracker>,
        refresh: Option<Arc<dyn RefreshSource>>,
        cancel: CancelToken,
    ) -> Self {
        let period = tracker.config().low_freq_period;
        let loop_tracker = tracker.clone();
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // A late tick publishes once, not a burst.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => {
                        tracing::debug!("Tracker service stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Some(source) = &refresh {
                            if let Err(e) = source.refresh(&loop_tracker) {
                                tracing::warn!("State refresh failed: {:#}", e);
                            }
                        }
                        loop_tracker.publish_low_frequency();
                    }
                }
            }
        });
        Self {
            tracker,
            cancel,
            handle,
        }
    }

    /// The tracker this service publishes
    pub fn tracker(&self) -> &Arc<StateTracker> {
        &self.tracker
    }

    /// Request shutdown and wait for the loop to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!("Tracker service task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::TrackerConfig;
    use printhost_core::SystemClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn fast_tracker() -> Arc<StateTracker> {
        Arc::new(StateTracker::new(
            Arc::new(SystemClock::new()),
            TrackerConfig {
                low_freq_period: Duration::from_millis(10),
                ..TrackerConfig::default()
            },
        ))
    }

    struct CountingSource(AtomicUsize);

    impl RefreshSource for CountingSource {
        fn refresh(&self, tracker: &StateTracker) -> anyhow::Result<()> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            tracker.update("probe", n as f64);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_periodic_publication() {
        let tracker = fast_tracker();
        let published = Arc::new(AtomicUsize::new(0));
        let p = published.clone();
        tracker.low_frequency().subscribe(move |_| {
            p.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let service = TrackerService::spawn(tracker, None, CancelToken::new());
        tokio::time::sleep(Duration::from_millis(60)).await;
        service.shutdown().await;

        assert!(published.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_refresh_source_is_polled() {
        let tracker = fast_tracker();
        let source = Arc::new(CountingSource(AtomicUsize::new(0)));
        let service =
            TrackerService::spawn(tracker.clone(), Some(source.clone()), CancelToken::new());
        tokio::time::sleep(Duration::from_millis(60)).await;
        service.shutdown().await;

        assert!(source.0.load(Ordering::SeqCst) >= 2);
        assert!(tracker.current_state().get("probe").is_some());
    }

    struct FailingSource;

    impl RefreshSource for FailingSource {
        fn refresh(&self, _tracker: &StateTracker) -> anyhow::Result<()> {
            anyhow::bail!("device unreachable")
        }
    }

    #[tokio::test]
    async fn test_refresh_errors_do_not_stop_publication() {
        let tracker = fast_tracker();
        let published = Arc::new(AtomicUsize::new(0));
        let p = published.clone();
        tracker.low_frequency().subscribe(move |_| {
            p.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let service =
            TrackerService::spawn(tracker, Some(Arc::new(FailingSource)), CancelToken::new());
        tokio::time::sleep(Duration::from_millis(60)).await;
        service.shutdown().await;

        assert!(published.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_shutdown_is_prompt() {
        let tracker = Arc::new(StateTracker::new(
            Arc::new(SystemClock::new()),
            TrackerConfig {
                low_freq_period: Duration::from_secs(3600),
                ..TrackerConfig::default()
            },
        ));
        let service = TrackerService::spawn(tracker, None, CancelToken::new());
        // Must not wait out the hour-long period.
        tokio::time::timeout(Duration::from_secs(1), service.shutdown())
            .await
            .expect("shutdown within timeout");
    }
}
