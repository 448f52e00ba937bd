//! Poll cycle driver.
//!
//! A cycle lists up to `batch_size` unread ids and hands them to the
//! [`MessageProcessor`]. Cycles never overlap: a request that arrives while
//! one is running is dropped. A rejected credential is invalidated and the
//! cycle retried once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_BATCH_SIZE, Settings};
use crate::error::PipelineError;
use crate::pipeline::processor::MessageProcessor;
use crate::pipeline::types::MessageOutcome;

/// Counts for one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub listed: usize,
    pub skipped: usize,
    pub notified: usize,
    pub notify_failed: usize,
    pub fetch_failed: usize,
    /// Whether the credential was refreshed and the cycle retried.
    pub retried_auth: bool,
}

impl CycleReport {
    fn from_outcomes(outcomes: &[(String, MessageOutcome)]) -> Self {
        let mut report = Self {
            listed: outcomes.len(),
            ..Default::default()
        };
        for (_, outcome) in outcomes {
            match outcome {
                MessageOutcome::Skipped => report.skipped += 1,
                MessageOutcome::Notified(_) => report.notified += 1,
                MessageOutcome::NotifyFailed(_) => report.notify_failed += 1,
                MessageOutcome::FetchFailed(_) => report.fetch_failed += 1,
            }
        }
        report
    }

    /// Messages that went through classification this cycle.
    pub fn processed(&self) -> usize {
        self.notified + self.notify_failed
    }
}

pub struct Poller {
    processor: Arc<MessageProcessor>,
    batch_size: usize,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when the cycle ends, including on panic.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Poller {
    pub fn new(processor: Arc<MessageProcessor>) -> Self {
        Self {
            processor,
            batch_size: DEFAULT_BATCH_SIZE,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn processor(&self) -> &Arc<MessageProcessor> {
        &self.processor
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one cycle. `None` when another cycle is already in flight.
    pub async fn run_cycle(&self) -> Option<Result<CycleReport, PipelineError>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Poll cycle already running, skipping tick");
            return None;
        }
        let _guard = InFlight(&self.in_flight);

        Some(self.cycle_with_auth_retry().await)
    }

    async fn cycle_with_auth_retry(&self) -> Result<CycleReport, PipelineError> {
        match self.attempt().await {
            Err(e) if e.is_auth() => {
                warn!(error = %e, "Mailbox credential rejected, refreshing and retrying once");
                self.processor.source().invalidate_credential().await;
                match self.attempt().await {
                    Ok(report) => Ok(CycleReport {
                        retried_auth: true,
                        ..report
                    }),
                    Err(e) if e.is_auth() => Err(PipelineError::AuthRejected(e.to_string())),
                    Err(e) => Err(e),
                }
            }
            other => other,
        }
    }

    async fn attempt(&self) -> Result<CycleReport, PipelineError> {
        let ids = self.processor.source().list_unread(self.batch_size).await?;
        if ids.is_empty() {
            debug!("No unread messages");
            return Ok(CycleReport::default());
        }

        let outcomes = self.processor.process_batch(&ids).await?;
        Ok(CycleReport::from_outcomes(&outcomes))
    }

    /// Current poll interval from persisted settings.
    pub async fn poll_interval(&self) -> Duration {
        match Settings::load(self.processor.settings_store().as_ref()).await {
            Ok(settings) => settings.poll_interval(),
            Err(e) => {
                warn!(error = %e, "Failed to load settings, using default poll interval");
                Settings::default().poll_interval()
            }
        }
    }
}

/// Spawn the background poll loop.
///
/// The first cycle runs immediately. The interval is re-read from settings
/// after every cycle. Returns a `JoinHandle` and a shutdown flag; set the flag
/// to stop after the current cycle.
pub fn spawn_poller(poller: Arc<Poller>) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        let mut period = poller.poll_interval().await;
        info!(interval_secs = period.as_secs(), "Poller started");

        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Poller shutting down");
                return;
            }

            match poller.run_cycle().await {
                Some(Ok(report)) => {
                    info!(
                        listed = report.listed,
                        notified = report.notified,
                        skipped = report.skipped,
                        notify_failed = report.notify_failed,
                        fetch_failed = report.fetch_failed,
                        "Poll cycle complete"
                    );
                }
                Some(Err(e)) => error!(error = %e, "Poll cycle failed, retrying next tick"),
                None => {}
            }

            let next = poller.poll_interval().await;
            if next != period {
                info!(interval_secs = next.as_secs(), "Poll interval changed");
                period = next;
                tick = tokio::time::interval_at(Instant::now() + period, period);
                tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            }
        }
    });

    (handle, shutdown_flag)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::pipeline::processor::test_support::*;
    use crate::store::{DedupTracker, MemoryStore, StateStore};

    async fn poller_for(source: Arc<StubSource>) -> (Arc<Poller>, Arc<RecordingNotifier>) {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let tracker = Arc::new(DedupTracker::load(store.clone()).await.unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let processor = MessageProcessor::new(source, notifier.clone(), tracker, store);
        (Arc::new(Poller::new(Arc::new(processor))), notifier)
    }

    fn inbox() -> Arc<StubSource> {
        Arc::new(StubSource::with(vec![
            raw_message("m1", "Hi", "a@x.io", "Can you send the slides?"),
            raw_message("m2", "News", "b@x.io", "Our newsletter is out."),
        ]))
    }

    #[tokio::test]
    async fn second_cycle_skips_everything() {
        let (poller, notifier) = poller_for(inbox()).await;

        let first = poller.run_cycle().await.unwrap().unwrap();
        assert_eq!(first.listed, 2);
        assert_eq!(first.notified, 2);

        let second = poller.run_cycle().await.unwrap().unwrap();
        assert_eq!(second.skipped, 2);
        assert_eq!(second.processed(), 0);
        assert_eq!(notifier.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn batch_size_limits_listing() {
        let (poller, _) = poller_for(inbox()).await;
        let poller = Poller::new(Arc::clone(poller.processor())).with_batch_size(1);
        let report = poller.run_cycle().await.unwrap().unwrap();
        assert_eq!(report.listed, 1);
    }

    #[tokio::test]
    async fn auth_rejection_invalidates_and_retries_once() {
        let source = inbox();
        source.reject_auth.store(1, Ordering::SeqCst);
        let (poller, _) = poller_for(source.clone()).await;

        let report = poller.run_cycle().await.unwrap().unwrap();
        assert!(report.retried_auth);
        assert_eq!(report.notified, 2);
        assert_eq!(source.invalidations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persistent_auth_rejection_fails_cycle() {
        let source = inbox();
        source.reject_auth.store(10, Ordering::SeqCst);
        let (poller, _) = poller_for(source.clone()).await;

        let err = poller.run_cycle().await.unwrap().unwrap_err();
        assert!(matches!(err, PipelineError::AuthRejected(_)));
        assert!(!poller.is_running());
    }

    #[tokio::test]
    async fn overlapping_cycle_is_dropped() {
        let (poller, _) = poller_for(inbox()).await;

        poller.in_flight.store(true, Ordering::SeqCst);
        assert!(poller.run_cycle().await.is_none());

        poller.in_flight.store(false, Ordering::SeqCst);
        assert!(poller.run_cycle().await.is_some());
        assert!(!poller.is_running());
    }

    #[tokio::test]
    async fn concurrent_requests_run_one_cycle() {
        let (poller, notifier) = poller_for(inbox()).await;
        let (a, b) = tokio::join!(poller.run_cycle(), poller.run_cycle());
        // Either both ran back to back or one was dropped; never double-notified.
        assert!(a.is_some() || b.is_some());
        assert_eq!(notifier.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn spawned_loop_runs_and_stops() {
        let (poller, notifier) = poller_for(inbox()).await;
        let (handle, shutdown) = spawn_poller(Arc::clone(&poller));

        for _ in 0..100 {
            if notifier.sent.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(notifier.sent.lock().unwrap().len(), 2);

        shutdown.store(true, Ordering::Relaxed);
        handle.abort();
    }
}
