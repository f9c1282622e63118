//! Folds the stream client's events into a deduplicated, monotonically
//! growing view of one batch and decides when the batch is done.
//!
//! A [`Reconciler`] is scoped to a single batch id and owns every piece of
//! per-batch state: the seen identity keys, the accepted results, the total
//! and the completion latch. Timers (completion debounce, stuck detector) are
//! plain deadlines checked by [`Reconciler::tick`], so dropping the
//! reconciler drops them too.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::model::{BatchStatus, ResultRecord};
use crate::stream::StreamEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Delay between optimistic local completion and its notification.
    pub completion_debounce: Duration,
    /// No data for this long after attaching raises [`Signal::PossiblyStuck`].
    pub stuck_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            completion_debounce: Duration::from_millis(500),
            stuck_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&Config> for Timing {
    fn from(config: &Config) -> Self {
        Self {
            completion_debounce: config.completion_debounce,
            stuck_timeout: config.stuck_timeout,
        }
    }
}

/// Counters shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressState {
    pub completed: u64,
    pub total: u64,
    pub is_processing_complete: bool,
}

impl ProgressState {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.completed as f64 / self.total as f64 * 100.0).min(100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub completed: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The batch is done. Emitted exactly once per reconciler.
    Completed(Completion),
    /// Nothing arrived within the stuck timeout. Advisory only.
    PossiblyStuck,
}

/// Per-batch reconciliation state.
#[derive(Debug)]
pub struct Reconciler {
    batch_id: String,
    timing: Timing,
    seen: HashSet<String>,
    /// Most recent first.
    results: VecDeque<ResultRecord>,
    total: u64,
    latched: bool,
    notified: bool,
    completion_due: Option<Instant>,
    stuck_due: Instant,
    received_data: bool,
    stuck: bool,
}

impl Reconciler {
    /// `initial_total` is the job count from the upload response, or 0 when
    /// it is not known yet.
    pub fn new(batch_id: impl Into<String>, initial_total: u64, timing: Timing, now: Instant) -> Self {
        Self {
            batch_id: batch_id.into(),
            timing,
            seen: HashSet::new(),
            results: VecDeque::new(),
            total: initial_total,
            latched: false,
            notified: false,
            completion_due: None,
            stuck_due: now + timing.stuck_timeout,
            received_data: false,
            stuck: false,
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn progress(&self) -> ProgressState {
        ProgressState {
            completed: self.completed(),
            total: self.total,
            is_processing_complete: self.latched,
        }
    }

    /// Accepted results, most recent first.
    pub fn results(&self) -> impl ExactSizeIterator<Item = &ResultRecord> {
        self.results.iter()
    }

    pub fn is_complete(&self) -> bool {
        self.latched
    }

    /// Whether the stuck advisory is currently raised.
    pub fn possibly_stuck(&self) -> bool {
        self.stuck
    }

    fn completed(&self) -> u64 {
        self.seen.len() as u64
    }

    /// Fold one stream event. Returns the signals that must fire right away;
    /// debounced ones come out of [`tick`](Self::tick).
    pub fn apply(&mut self, event: &StreamEvent, now: Instant) -> Vec<Signal> {
        match event {
            StreamEvent::Connected | StreamEvent::Error(_) => Vec::new(),
            StreamEvent::Progress { total, .. } => {
                self.mark_data();
                self.raise_total(*total);
                self.check_optimistic(now);
                Vec::new()
            }
            StreamEvent::Result(record) => {
                self.mark_data();
                self.accept(record);
                self.check_optimistic(now);
                Vec::new()
            }
            StreamEvent::Complete { total, .. } => {
                self.mark_data();
                self.terminate(*total).into_iter().collect()
            }
        }
    }

    /// Take in a status snapshot, e.g. the one fetched when resuming, so the
    /// counters start from what the backend already knows.
    pub fn absorb(&mut self, status: &BatchStatus, now: Instant) {
        if status.expected_total() > 0 || !status.results.is_empty() {
            self.mark_data();
        }
        self.raise_total(status.expected_total());
        for record in &status.results {
            self.accept(record);
        }
        self.check_optimistic(now);
    }

    /// Fire whatever deadlines have passed.
    pub fn tick(&mut self, now: Instant) -> Vec<Signal> {
        let mut signals = Vec::new();
        if self.completion_due.is_some_and(|due| now >= due) {
            self.completion_due = None;
            if !self.notified {
                self.notified = true;
                log::info!(
                    "batch {}: all {} results in, completing",
                    self.batch_id,
                    self.completed()
                );
                signals.push(Signal::Completed(Completion {
                    completed: self.completed(),
                    total: self.total,
                }));
            }
        }
        if !self.received_data && !self.stuck && !self.latched && now >= self.stuck_due {
            self.stuck = true;
            log::warn!(
                "batch {}: no data after {:.0}s, batch may already be finished",
                self.batch_id,
                self.timing.stuck_timeout.as_secs_f64()
            );
            signals.push(Signal::PossiblyStuck);
        }
        signals
    }

    fn mark_data(&mut self) {
        self.received_data = true;
        self.stuck = false;
    }

    fn raise_total(&mut self, reported: u64) {
        if reported == 0 || self.latched {
            return;
        }
        if reported > self.total {
            self.total = reported;
        } else if reported < self.total {
            log::debug!(
                "batch {}: ignoring lower total {reported} (keeping {})",
                self.batch_id,
                self.total
            );
        }
    }

    fn accept(&mut self, record: &ResultRecord) {
        let key = record.identity_key();
        if self.seen.contains(&key) {
            return;
        }
        self.seen.insert(key);
        self.results.push_front(record.clone());
    }

    fn check_optimistic(&mut self, now: Instant) {
        if self.latched || self.total == 0 || self.completed() < self.total {
            return;
        }
        self.latched = true;
        self.completion_due = Some(now + self.timing.completion_debounce);
        log::debug!(
            "batch {}: {}/{} observed locally",
            self.batch_id,
            self.completed(),
            self.total
        );
    }

    fn terminate(&mut self, reported_total: u64) -> Option<Signal> {
        let completed = self.completed();
        if reported_total < completed {
            log::warn!(
                "batch {}: backend reported total {reported_total} below {completed} accepted results, using {completed}",
                self.batch_id
            );
        }
        self.total = reported_total.max(completed);
        self.latched = true;
        self.completion_due = None;
        self.stuck = false;
        if self.notified {
            return None;
        }
        self.notified = true;
        log::info!("batch {} complete: {completed}/{}", self.batch_id, self.total);
        Some(Signal::Completed(Completion {
            completed,
            total: self.total,
        }))
    }
}

/// Owns the reconciler of the batch being monitored and swaps it only when
/// the batch id changes.
#[derive(Debug, Default)]
pub struct BatchMonitor {
    timing: Timing,
    current: Option<Reconciler>,
}

impl BatchMonitor {
    pub fn new(timing: Timing) -> Self {
        Self {
            timing,
            current: None,
        }
    }

    /// Point the monitor at `batch_id`. Returns true when the reconciler was
    /// replaced (or dropped); attaching to the same id keeps all state.
    pub fn attach(&mut self, batch_id: Option<&str>, initial_total: u64, now: Instant) -> bool {
        match (batch_id, self.current.as_mut()) {
            (None, None) => false,
            (None, Some(_)) => {
                self.current = None;
                true
            }
            (Some(id), Some(current)) if current.batch_id == id => {
                current.raise_total(initial_total);
                false
            }
            (Some(id), _) => {
                log::debug!("monitoring batch {id}");
                self.current = Some(Reconciler::new(id, initial_total, self.timing, now));
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.current = None;
    }

    pub fn apply(&mut self, event: &StreamEvent, now: Instant) -> Vec<Signal> {
        self.current
            .as_mut()
            .map(|r| r.apply(event, now))
            .unwrap_or_default()
    }

    pub fn tick(&mut self, now: Instant) -> Vec<Signal> {
        self.current
            .as_mut()
            .map(|r| r.tick(now))
            .unwrap_or_default()
    }

    pub fn reconciler(&self) -> Option<&Reconciler> {
        self.current.as_ref()
    }

    pub fn reconciler_mut(&mut self) -> Option<&mut Reconciler> {
        self.current.as_mut()
    }

    pub fn progress(&self) -> ProgressState {
        self.current
            .as_ref()
            .map(Reconciler::progress)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BatchProgress, BatchState, OriginalData};

    fn record(job: &str) -> ResultRecord {
        ResultRecord {
            job_id: Some(job.to_string()),
            original_data: OriginalData::default(),
            scraped_data: None,
            processing_time: None,
            processed_at: None,
            worker: None,
            error: None,
        }
    }

    fn result(job: &str) -> StreamEvent {
        StreamEvent::Result(Box::new(record(job)))
    }

    fn progress(total: u64) -> StreamEvent {
        StreamEvent::Progress {
            completed: None,
            total,
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn completions(signals: &[Signal]) -> usize {
        signals
            .iter()
            .filter(|s| matches!(s, Signal::Completed(_)))
            .count()
    }

    #[test]
    fn three_distinct_results_complete_once() {
        let t0 = Instant::now();
        let mut r = Reconciler::new("b1", 3, Timing::default(), t0);
        let mut signals = Vec::new();
        for job in ["a", "b", "c"] {
            signals.extend(r.apply(&result(job), t0));
        }
        assert!(signals.is_empty(), "local completion is debounced");
        assert_eq!(
            r.progress(),
            ProgressState {
                completed: 3,
                total: 3,
                is_processing_complete: true
            }
        );

        assert!(r.tick(t0 + ms(499)).is_empty());
        assert_eq!(
            r.tick(t0 + ms(500)),
            vec![Signal::Completed(Completion {
                completed: 3,
                total: 3
            })]
        );
        assert_eq!(r.results().len(), 3);

        // the transport's own terminal event must not notify again
        let late = r.apply(
            &StreamEvent::Complete {
                completed: 3,
                total: 3,
            },
            t0 + ms(600),
        );
        assert!(late.is_empty());
        assert!(r.tick(t0 + ms(5000)).is_empty());
    }

    #[test]
    fn redelivered_result_is_ignored() {
        let t0 = Instant::now();
        let mut r = Reconciler::new("b1", 3, Timing::default(), t0);
        for job in ["a", "b", "b", "c"] {
            r.apply(&result(job), t0);
        }
        assert_eq!(r.results().len(), 3);
        assert_eq!(r.progress().completed, 3);
        let order: Vec<_> = r.results().map(|rec| rec.identity_key()).collect();
        assert_eq!(order, ["job:c", "job:b", "job:a"]);
    }

    #[test]
    fn completed_and_total_never_regress() {
        let t0 = Instant::now();
        let mut r = Reconciler::new("b1", 0, Timing::default(), t0);
        let events = [
            progress(6),
            result("a"),
            result("a"),
            progress(2),
            result("b"),
            progress(0),
            result("a"),
            result("c"),
            progress(4),
        ];
        let mut last = r.progress();
        for event in &events {
            r.apply(event, t0);
            let now = r.progress();
            assert!(now.completed >= last.completed);
            assert!(now.total >= last.total);
            last = now;
        }
        assert_eq!(last.total, 6);
        assert_eq!(last.completed, 3);
    }

    #[test]
    fn stale_lower_total_is_corrected_only_at_completion() {
        let t0 = Instant::now();
        let mut r = Reconciler::new("b1", 5, Timing::default(), t0);
        for job in ["a", "b", "c", "d"] {
            r.apply(&result(job), t0);
        }
        r.apply(&progress(4), t0);
        assert_eq!(r.progress().total, 5, "mid-stream total stays at the maximum");
        assert!(!r.is_complete());

        let signals = r.apply(
            &StreamEvent::Complete {
                completed: 4,
                total: 4,
            },
            t0,
        );
        assert_eq!(
            signals,
            vec![Signal::Completed(Completion {
                completed: 4,
                total: 4
            })]
        );
        assert_eq!(r.progress().total, 4);
    }

    #[test]
    fn final_total_never_truncates_accepted_results() {
        let t0 = Instant::now();
        let mut r = Reconciler::new("b1", 0, Timing::default(), t0);
        for job in ["a", "b", "c"] {
            r.apply(&result(job), t0);
        }
        let signals = r.apply(
            &StreamEvent::Complete {
                completed: 2,
                total: 2,
            },
            t0,
        );
        assert_eq!(
            signals,
            vec![Signal::Completed(Completion {
                completed: 3,
                total: 3
            })]
        );
    }

    #[test]
    fn terminal_event_preempts_pending_debounce() {
        let t0 = Instant::now();
        let mut r = Reconciler::new("b1", 2, Timing::default(), t0);
        r.apply(&result("a"), t0);
        r.apply(&result("b"), t0);
        let mut signals = r.apply(
            &StreamEvent::Complete {
                completed: 2,
                total: 2,
            },
            t0 + ms(100),
        );
        signals.extend(r.tick(t0 + ms(1000)));
        assert_eq!(completions(&signals), 1);
    }

    #[test]
    fn stuck_detector_is_advisory_and_fires_once() {
        let t0 = Instant::now();
        let mut r = Reconciler::new("b1", 3, Timing::default(), t0);
        assert!(r.tick(t0 + Duration::from_secs(4)).is_empty());
        assert_eq!(r.tick(t0 + Duration::from_secs(5)), vec![Signal::PossiblyStuck]);
        assert!(r.possibly_stuck());
        assert!(r.tick(t0 + Duration::from_secs(9)).is_empty());
        assert_eq!(r.progress().completed, 0);

        // data showing up clears the advisory
        r.apply(&result("a"), t0 + Duration::from_secs(10));
        assert!(!r.possibly_stuck());
    }

    #[test]
    fn stuck_detector_stays_quiet_when_data_arrives() {
        let t0 = Instant::now();
        let mut r = Reconciler::new("b1", 3, Timing::default(), t0);
        r.apply(&progress(3), t0 + Duration::from_secs(1));
        assert!(r.tick(t0 + Duration::from_secs(30)).is_empty());
    }

    #[test]
    fn absorb_seeds_counters_from_snapshot() {
        let t0 = Instant::now();
        let mut r = Reconciler::new("b2", 0, Timing::default(), t0);
        let snapshot = BatchStatus {
            batch_id: "b2".into(),
            status: BatchState::Processing,
            progress: BatchProgress {
                total: 4,
                completed: 2,
                ..Default::default()
            },
            results: vec![record("a"), record("b")],
            summary: None,
            total_jobs: None,
        };
        r.absorb(&snapshot, t0);
        r.apply(&result("b"), t0);
        assert_eq!(
            r.progress(),
            ProgressState {
                completed: 2,
                total: 4,
                is_processing_complete: false
            }
        );
    }

    #[test]
    fn monitor_keeps_state_for_same_batch() {
        let t0 = Instant::now();
        let mut monitor = BatchMonitor::new(Timing::default());
        assert!(monitor.attach(Some("b1"), 3, t0));
        monitor.apply(&result("a"), t0);
        monitor.apply(&result("b"), t0);
        let before = monitor.progress();

        assert!(!monitor.attach(Some("b1"), 0, t0 + ms(50)));
        assert!(!monitor.attach(Some("b1"), 3, t0 + ms(60)));
        assert_eq!(monitor.progress(), before);
        assert_eq!(monitor.reconciler().map(|r| r.results().len()), Some(2));

        assert!(monitor.attach(Some("b2"), 7, t0));
        assert_eq!(
            monitor.progress(),
            ProgressState {
                completed: 0,
                total: 7,
                is_processing_complete: false
            }
        );

        assert!(monitor.attach(None, 0, t0));
        assert!(monitor.reconciler().is_none());
        assert!(monitor.apply(&result("x"), t0).is_empty());
    }

    #[test]
    fn percentage_is_clamped() {
        let p = ProgressState {
            completed: 5,
            total: 4,
            is_processing_complete: true,
        };
        assert_eq!(p.percentage(), 100.0);
        assert_eq!(ProgressState::default().percentage(), 0.0);
    }
}
