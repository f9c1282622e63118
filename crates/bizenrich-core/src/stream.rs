//! Live progress channel for one batch, with a polling fallback.
//!
//! A [`StreamClient`] supervises at most one channel at a time. The channel
//! starts on the live SSE stream when the transport policy allows it and
//! drops to fixed-interval status polling when it does not, or when the live
//! stream closes under it. Whatever the transport, the caller sees the same
//! normalized [`StreamEvent`]s and exactly one `Complete`.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::stream::{BoxStream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::ApiError;
use crate::config::Config;
use crate::model::{BatchStatus, ResultRecord};
use crate::sse::{SseFrame, WireEvent};

/// The two backend capabilities the stream client needs.
pub trait BatchBackend: Send + Sync + 'static {
    /// Fetch the current status and known results of a batch.
    fn fetch_status(
        &self,
        batch_id: &str,
    ) -> impl Future<Output = Result<BatchStatus, ApiError>> + Send;

    /// Open the live event stream of a batch.
    fn open_events(
        &self,
        batch_id: &str,
    ) -> impl Future<Output = Result<BoxStream<'static, Result<SseFrame, ApiError>>, ApiError>> + Send;
}

/// Lifecycle of a channel. `Live -> Polling` is the only lateral move and
/// `Completed` has no way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Live,
    Polling,
    Completed,
}

impl ChannelState {
    pub fn can_transition_to(self, next: ChannelState) -> bool {
        use ChannelState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Live | Polling | Completed | Idle)
                | (Live, Polling | Completed | Idle)
                | (Polling, Completed | Idle)
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Live => "Live",
            Self::Polling => "Polling",
            Self::Completed => "Done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// The backend sent an `error` event on the live stream.
    Backend,
    /// The live channel is gone; the client switched to polling.
    Degraded,
    /// The status pre-check before opening the live channel failed.
    PreCheck,
    /// One polling tick failed; polling continues.
    Poll,
}

/// A non-fatal problem reported to the caller. None of these end the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamError {
    pub kind: StreamErrorKind,
    pub message: String,
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Normalized events delivered to the sink.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected,
    /// `completed` is only a hint; consumers derive their own count.
    Progress { completed: Option<u64>, total: u64 },
    /// May be a redelivery of a record already seen.
    Result(Box<ResultRecord>),
    /// Terminal. Delivered exactly once per batch.
    Complete { completed: u64, total: u64 },
    Error(StreamError),
}

pub type EventSink = Arc<dyn Fn(StreamEvent) + Send + Sync>;

/// Snapshot of the channel for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub batch_id: Option<String>,
    pub state: ChannelState,
    pub last_error: Option<StreamError>,
}

impl ConnectionStatus {
    fn idle() -> Self {
        Self {
            batch_id: None,
            state: ChannelState::Idle,
            last_error: None,
        }
    }
}

struct ActiveChannel {
    batch_id: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ActiveChannel {
    fn shutdown(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Supervises one live channel per active batch.
pub struct StreamClient<B: BatchBackend> {
    backend: Arc<B>,
    prefer_polling: bool,
    poll_interval: Duration,
    status: Arc<watch::Sender<ConnectionStatus>>,
    active: Mutex<Option<ActiveChannel>>,
    /// Most recent batch that reached a terminal event; not reconnected.
    completed: Arc<Mutex<Option<String>>>,
}

impl<B: BatchBackend> StreamClient<B> {
    pub fn new(backend: Arc<B>, config: &Config) -> Self {
        Self::with_policy(backend, config.prefers_polling(), config.poll_interval)
    }

    pub fn with_policy(backend: Arc<B>, prefer_polling: bool, poll_interval: Duration) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::idle());
        Self {
            backend,
            prefer_polling,
            poll_interval,
            status: Arc::new(status),
            active: Mutex::new(None),
            completed: Arc::new(Mutex::new(None)),
        }
    }

    /// Attach to `batch_id`, or detach when it is `None`.
    ///
    /// Connecting again to the batch already being followed, or to a batch
    /// that already completed, is a no-op. Connecting to a different batch
    /// tears the current channel down first. Must be called from within a
    /// tokio runtime.
    pub fn connect(&self, batch_id: Option<&str>, sink: EventSink) {
        let Some(batch_id) = batch_id else {
            self.disconnect();
            return;
        };

        if lock(&self.completed).as_deref() == Some(batch_id) {
            log::debug!("batch {batch_id} already completed, not reconnecting");
            return;
        }

        let mut active = lock(&self.active);
        if active.as_ref().is_some_and(|ch| ch.batch_id == batch_id) {
            log::debug!("already connected to batch {batch_id}");
            return;
        }
        if let Some(previous) = active.take() {
            log::info!("switching from batch {} to {batch_id}", previous.batch_id);
            previous.shutdown();
        }

        self.status.send_replace(ConnectionStatus {
            batch_id: Some(batch_id.to_string()),
            state: ChannelState::Connecting,
            last_error: None,
        });

        let cancel = CancellationToken::new();
        let task = ChannelTask {
            backend: self.backend.clone(),
            batch_id: batch_id.to_string(),
            sink,
            status: self.status.clone(),
            completed: self.completed.clone(),
            cancel: cancel.clone(),
            prefer_polling: self.prefer_polling,
            poll_interval: self.poll_interval,
        };
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = task_cancel.cancelled() => {}
                _ = task.drive() => {}
            }
        });

        *active = Some(ActiveChannel {
            batch_id: batch_id.to_string(),
            cancel,
            task: handle,
        });
    }

    /// Close any open channel and stop any polling timer.
    pub fn disconnect(&self) {
        if let Some(channel) = lock(&self.active).take() {
            log::info!("disconnecting from batch {}", channel.batch_id);
            channel.shutdown();
        }
        self.status.send_replace(ConnectionStatus::idle());
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Batch currently followed, if any.
    pub fn batch_id(&self) -> Option<String> {
        lock(&self.active).as_ref().map(|ch| ch.batch_id.clone())
    }
}

impl<B: BatchBackend> Drop for StreamClient<B> {
    fn drop(&mut self) {
        if let Some(channel) = lock(&self.active).take() {
            channel.shutdown();
        }
    }
}

/// Everything one channel task needs; lives as long as the task.
///
/// Abort only lands at the next `.await`, so every side effect also checks
/// `cancel` first. Once the owner has cancelled, nothing more reaches the
/// sink or the shared status.
struct ChannelTask<B> {
    backend: Arc<B>,
    batch_id: String,
    sink: EventSink,
    status: Arc<watch::Sender<ConnectionStatus>>,
    completed: Arc<Mutex<Option<String>>>,
    cancel: CancellationToken,
    prefer_polling: bool,
    poll_interval: Duration,
}

impl<B: BatchBackend> ChannelTask<B> {
    async fn drive(&self) {
        if self.prefer_polling {
            log::info!("batch {}: proxied backend, polling instead of streaming", self.batch_id);
            self.poll().await;
            return;
        }

        // One pre-check: a batch that already finished still streams its
        // backlog, but the total must be known up front.
        match self.backend.fetch_status(&self.batch_id).await {
            Ok(status) if status.status.is_terminal() => {
                let total = status.expected_total();
                log::info!("batch {} already completed ({total} jobs), fetching backlog", self.batch_id);
                if total > 0 {
                    self.emit(StreamEvent::Progress {
                        completed: None,
                        total,
                    });
                }
            }
            Ok(status) => {
                log::debug!("batch {} is {}", self.batch_id, status.status.label());
            }
            Err(e) => {
                self.report(
                    StreamErrorKind::PreCheck,
                    format!("Failed to check batch status: {e}"),
                );
                self.poll().await;
                return;
            }
        }

        let mut events = match self.backend.open_events(&self.batch_id).await {
            Ok(events) => events,
            Err(e) => {
                self.report(
                    StreamErrorKind::Degraded,
                    format!("Failed to establish live connection ({e}), using polling"),
                );
                self.poll().await;
                return;
            }
        };

        self.set_state(ChannelState::Live);
        log::info!("batch {}: live stream open", self.batch_id);

        while let Some(item) = events.next().await {
            match item {
                Ok(frame) => match WireEvent::decode(&frame) {
                    Ok(Some(event)) => {
                        if self.handle_wire(event) {
                            return;
                        }
                    }
                    Ok(None) => log::debug!("ignoring '{}' event", frame.event),
                    Err(e) => log::warn!("quarantined malformed '{}' event: {e}", frame.event),
                },
                Err(e) => {
                    log::warn!("batch {}: live stream failed: {e}", self.batch_id);
                    break;
                }
            }
        }
        drop(events);

        self.report(
            StreamErrorKind::Degraded,
            "Connection lost. Switching to polling...".to_string(),
        );
        self.poll().await;
    }

    /// Returns true once the batch is complete.
    fn handle_wire(&self, event: WireEvent) -> bool {
        match event {
            WireEvent::Connected => {
                log::debug!("batch {}: stream acknowledged", self.batch_id);
                self.update_status(|s| s.last_error.take().is_some());
                self.emit(StreamEvent::Connected);
            }
            WireEvent::Progress(p) => self.emit(StreamEvent::Progress {
                completed: p.completed,
                total: p.total,
            }),
            WireEvent::Result(record) => self.emit(StreamEvent::Result(record)),
            WireEvent::Complete(c) => {
                self.finish(c.completed, c.total);
                return true;
            }
            WireEvent::Error(e) => {
                let message = match e.error {
                    Some(detail) => format!("{} ({detail})", e.message),
                    None => e.message,
                };
                self.report(StreamErrorKind::Backend, message);
            }
        }
        false
    }

    /// Fixed-interval status polling until a terminal status shows up.
    async fn poll(&self) {
        self.set_state(ChannelState::Polling);
        log::info!(
            "batch {}: polling every {:.1}s",
            self.batch_id,
            self.poll_interval.as_secs_f64()
        );

        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let status = match self.backend.fetch_status(&self.batch_id).await {
                Ok(status) => status,
                Err(e) => {
                    self.report(StreamErrorKind::Poll, format!("Status poll failed: {e}"));
                    continue;
                }
            };

            self.update_status(|s| {
                if s.last_error.as_ref().is_some_and(|e| e.kind == StreamErrorKind::Poll) {
                    s.last_error = None;
                    return true;
                }
                false
            });
            log::debug!(
                "batch {}: {} ({} results)",
                self.batch_id,
                status.status.label(),
                status.results.len()
            );

            let total = status.expected_total();
            self.emit(StreamEvent::Progress {
                completed: Some(status.progress.completed),
                total,
            });
            let terminal = status.status.is_terminal();
            let completed = status.progress.completed;
            // The whole known list every tick; deduplication is downstream.
            for record in status.results {
                if self.cancel.is_cancelled() {
                    return;
                }
                self.emit(StreamEvent::Result(Box::new(record)));
            }
            if terminal {
                self.finish(completed, total);
                return;
            }
        }
    }

    fn finish(&self, completed: u64, total: u64) {
        if self.cancel.is_cancelled() {
            return;
        }
        *lock(&self.completed) = Some(self.batch_id.clone());
        self.set_state(ChannelState::Completed);
        log::info!("batch {} complete: {completed}/{total}", self.batch_id);
        self.emit(StreamEvent::Complete { completed, total });
    }

    fn set_state(&self, next: ChannelState) {
        self.update_status(|s| {
            if s.state == next {
                return false;
            }
            if s.state.can_transition_to(next) {
                log::debug!("batch {}: {} -> {}", self.batch_id, s.state.label(), next.label());
                s.state = next;
                true
            } else {
                log::warn!(
                    "batch {}: refusing transition {} -> {}",
                    self.batch_id,
                    s.state.label(),
                    next.label()
                );
                false
            }
        });
    }

    fn report(&self, kind: StreamErrorKind, message: String) {
        if self.cancel.is_cancelled() {
            return;
        }
        log::warn!("batch {}: {message}", self.batch_id);
        let err = StreamError { kind, message };
        self.update_status(|s| {
            s.last_error = Some(err.clone());
            true
        });
        self.emit(StreamEvent::Error(err));
    }

    /// The cancellation check runs under the watch lock, which `connect` and
    /// `disconnect` also take after cancelling.
    fn update_status(&self, modify: impl FnOnce(&mut ConnectionStatus) -> bool) {
        self.status.send_if_modified(|s| {
            if self.cancel.is_cancelled() {
                return false;
            }
            modify(s)
        });
    }

    fn emit(&self, event: StreamEvent) {
        if self.cancel.is_cancelled() {
            log::debug!("batch {}: dropping event after cancel", self.batch_id);
            return;
        }
        (self.sink)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::stream;

    use crate::model::{BatchProgress, BatchState, OriginalData};

    fn record(job: &str) -> ResultRecord {
        ResultRecord {
            job_id: Some(job.to_string()),
            original_data: OriginalData {
                name: job.to_uppercase(),
                ..Default::default()
            },
            scraped_data: None,
            processing_time: None,
            processed_at: None,
            worker: None,
            error: None,
        }
    }

    fn status(state: BatchState, total: u64, jobs: &[&str]) -> BatchStatus {
        BatchStatus {
            batch_id: "b1".into(),
            status: state,
            progress: BatchProgress {
                total,
                completed: jobs.len() as u64,
                ..Default::default()
            },
            results: jobs.iter().map(|j| record(j)).collect(),
            summary: None,
            total_jobs: None,
        }
    }

    fn frame(event: &str, data: String) -> Result<SseFrame, ApiError> {
        Ok(SseFrame {
            event: event.into(),
            data,
            id: None,
        })
    }

    fn result_frame(job: &str) -> Result<SseFrame, ApiError> {
        frame("result", serde_json::to_string(&record(job)).unwrap())
    }

    enum Script {
        /// Stream yields these frames, then ends.
        Frames(Vec<Result<SseFrame, ApiError>>),
        /// Stream yields these frames, then stays open.
        Hold(Vec<Result<SseFrame, ApiError>>),
        Refuse,
    }

    struct FakeBackend {
        statuses: Mutex<VecDeque<Result<BatchStatus, ApiError>>>,
        last: Mutex<Option<BatchStatus>>,
        script: Mutex<Option<Script>>,
        status_calls: AtomicUsize,
        stream_calls: AtomicUsize,
    }

    impl FakeBackend {
        fn new(statuses: Vec<Result<BatchStatus, ApiError>>, script: Script) -> Arc<Self> {
            Arc::new(Self {
                statuses: Mutex::new(statuses.into()),
                last: Mutex::new(None),
                script: Mutex::new(Some(script)),
                status_calls: AtomicUsize::new(0),
                stream_calls: AtomicUsize::new(0),
            })
        }
    }

    impl BatchBackend for FakeBackend {
        async fn fetch_status(&self, _batch_id: &str) -> Result<BatchStatus, ApiError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let next = lock(&self.statuses).pop_front();
            match next {
                Some(Ok(s)) => {
                    *lock(&self.last) = Some(s.clone());
                    Ok(s)
                }
                Some(Err(e)) => Err(e),
                None => lock(&self.last)
                    .clone()
                    .ok_or_else(|| ApiError::BatchNotFound("b1".into())),
            }
        }

        async fn open_events(
            &self,
            _batch_id: &str,
        ) -> Result<BoxStream<'static, Result<SseFrame, ApiError>>, ApiError> {
            self.stream_calls.fetch_add(1, Ordering::SeqCst);
            match lock(&self.script).take() {
                Some(Script::Frames(frames)) => Ok(stream::iter(frames).boxed()),
                Some(Script::Hold(frames)) => {
                    Ok(stream::iter(frames).chain(stream::pending()).boxed())
                }
                Some(Script::Refuse) | None => Err(ApiError::Rejected {
                    status: 502,
                    message: "bad gateway".into(),
                }),
            }
        }
    }

    fn collector() -> (EventSink, Arc<Mutex<Vec<StreamEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let sink: EventSink = Arc::new(move |e| lock(&sink_events).push(e));
        (sink, events)
    }

    fn completes(events: &[StreamEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Complete { .. }))
            .count()
    }

    #[test]
    fn state_machine_edges() {
        use ChannelState::*;
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Live));
        assert!(Connecting.can_transition_to(Polling));
        assert!(Live.can_transition_to(Polling));
        assert!(!Polling.can_transition_to(Live));
        assert!(!Idle.can_transition_to(Live));
        for next in [Idle, Connecting, Live, Polling] {
            assert!(!Completed.can_transition_to(next));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn live_stream_delivers_events_and_completes_once() {
        let backend = FakeBackend::new(
            vec![Ok(status(BatchState::Processing, 3, &[]))],
            Script::Frames(vec![
                frame("connected", r#"{"batchId":"b1"}"#.into()),
                frame("progress", r#"{"completed":0,"total":3,"percentage":0}"#.into()),
                result_frame("a"),
                result_frame("a"),
                result_frame("b"),
                frame("complete", r#"{"completed":2,"total":3,"message":"done"}"#.into()),
            ]),
        );
        let client = StreamClient::with_policy(backend.clone(), false, Duration::from_secs(2));
        let (sink, events) = collector();

        client.connect(Some("b1"), sink.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;

        let events = lock(&events).clone();
        assert_eq!(events[0], StreamEvent::Connected);
        let results = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Result(_)))
            .count();
        assert_eq!(results, 3, "redeliveries are forwarded untouched");
        assert_eq!(
            events.last(),
            Some(&StreamEvent::Complete {
                completed: 2,
                total: 3
            })
        );
        assert_eq!(completes(&events), 1);
        assert_eq!(client.status().state, ChannelState::Completed);

        // completed latch: no second channel for the same batch, even after
        // an explicit disconnect
        client.disconnect();
        client.connect(Some("b1"), sink);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.stream_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_connect_is_idempotent() {
        let backend = FakeBackend::new(
            vec![Ok(status(BatchState::Processing, 3, &[]))],
            Script::Hold(vec![]),
        );
        let client = StreamClient::with_policy(backend.clone(), false, Duration::from_secs(2));
        let (sink, _events) = collector();

        for _ in 0..5 {
            client.connect(Some("b1"), sink.clone());
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(backend.stream_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.status_calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.status().state, ChannelState::Live);
    }

    #[tokio::test(start_paused = true)]
    async fn proxied_backend_polls_without_opening_stream() {
        let backend = FakeBackend::new(
            vec![
                Ok(status(BatchState::Processing, 2, &["a"])),
                Ok(status(BatchState::Completed, 2, &["a", "b"])),
            ],
            Script::Refuse,
        );
        let client = StreamClient::with_policy(backend.clone(), true, Duration::from_secs(2));
        let (sink, events) = collector();

        client.connect(Some("b1"), sink);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(client.status().state, ChannelState::Polling);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let events = lock(&events).clone();
        assert_eq!(backend.stream_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.status_calls.load(Ordering::SeqCst), 2, "polling stops at completion");
        let results = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Result(_)))
            .count();
        assert_eq!(results, 3, "every tick re-sends the full list");
        assert_eq!(completes(&events), 1);
        assert_eq!(client.status().state, ChannelState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_stream_falls_back_to_polling() {
        let backend = FakeBackend::new(
            vec![
                Ok(status(BatchState::Processing, 2, &[])),
                Ok(status(BatchState::Completed, 2, &["a", "b"])),
            ],
            Script::Frames(vec![
                result_frame("a"),
                Err(ApiError::Stream("connection reset".into())),
            ]),
        );
        let client = StreamClient::with_policy(backend.clone(), false, Duration::from_secs(2));
        let (sink, events) = collector();

        client.connect(Some("b1"), sink);
        tokio::time::sleep(Duration::from_secs(3)).await;

        let events = lock(&events).clone();
        assert!(matches!(&events[0], StreamEvent::Result(r) if r.identity_key() == "job:a"));
        assert!(matches!(
            &events[1],
            StreamEvent::Error(StreamError { kind: StreamErrorKind::Degraded, .. })
        ));
        assert_eq!(completes(&events), 1);
        assert_eq!(client.status().state, ChannelState::Completed);
        assert_eq!(
            client.status().last_error.map(|e| e.kind),
            Some(StreamErrorKind::Degraded)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn precheck_primes_total_for_finished_batch() {
        let backend = FakeBackend::new(
            vec![Ok(status(BatchState::Completed, 4, &[]))],
            Script::Hold(vec![]),
        );
        let client = StreamClient::with_policy(backend, false, Duration::from_secs(2));
        let (sink, events) = collector();

        client.connect(Some("b1"), sink);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(
            lock(&events).first(),
            Some(&StreamEvent::Progress {
                completed: None,
                total: 4
            })
        );
        assert_eq!(client.status().state, ChannelState::Live);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_precheck_goes_straight_to_polling() {
        let backend = FakeBackend::new(
            vec![
                Err(ApiError::Timeout),
                Ok(status(BatchState::Completed, 1, &["a"])),
            ],
            Script::Hold(vec![]),
        );
        let client = StreamClient::with_policy(backend.clone(), false, Duration::from_secs(2));
        let (sink, events) = collector();

        client.connect(Some("b1"), sink);
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(backend.stream_calls.load(Ordering::SeqCst), 0);
        let events = lock(&events).clone();
        assert!(matches!(
            &events[0],
            StreamEvent::Error(StreamError { kind: StreamErrorKind::PreCheck, .. })
        ));
        assert_eq!(completes(&events), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_failures_are_advisory() {
        let backend = FakeBackend::new(
            vec![
                Err(ApiError::Timeout),
                Ok(status(BatchState::CompletedWithErrors, 1, &["a"])),
            ],
            Script::Refuse,
        );
        let client = StreamClient::with_policy(backend, true, Duration::from_secs(2));
        let (sink, events) = collector();

        client.connect(Some("b1"), sink);
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(
            client.status().last_error.map(|e| e.kind),
            Some(StreamErrorKind::Poll)
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(completes(&lock(&events)), 1);
        assert_eq!(client.status().last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_stops_polling_timer() {
        let backend = FakeBackend::new(
            vec![Ok(status(BatchState::Processing, 5, &[]))],
            Script::Refuse,
        );
        let client = StreamClient::with_policy(backend.clone(), true, Duration::from_secs(2));
        let (sink, _events) = collector();

        client.connect(Some("b1"), sink);
        tokio::time::sleep(Duration::from_millis(4500)).await;
        let calls = backend.status_calls.load(Ordering::SeqCst);
        assert_eq!(calls, 2);

        client.disconnect();
        assert_eq!(client.status().state, ChannelState::Idle);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(backend.status_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_batches_replaces_the_channel() {
        let backend = FakeBackend::new(
            vec![Ok(status(BatchState::Processing, 5, &[]))],
            Script::Refuse,
        );
        let client = StreamClient::with_policy(backend, true, Duration::from_secs(2));
        let (sink, _events) = collector();

        client.connect(Some("b1"), sink.clone());
        client.connect(Some("b2"), sink.clone());
        assert_eq!(client.batch_id().as_deref(), Some("b2"));

        client.connect(None, sink);
        assert_eq!(client.batch_id(), None);
        assert_eq!(client.status().state, ChannelState::Idle);
    }
    #[tokio::test(start_paused = true)]
    async fn completion_latch_keeps_only_latest_batch() {
        let backend = FakeBackend::new(
            vec![Ok(status(BatchState::Completed, 1, &["a"]))],
            Script::Refuse,
        );
        let client = StreamClient::with_policy(backend.clone(), true, Duration::from_secs(2));
        let (sink, events) = collector();

        client.connect(Some("b1"), sink.clone());
        tokio::time::sleep(Duration::from_secs(3)).await;
        client.connect(Some("b1"), sink.clone());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(backend.status_calls.load(Ordering::SeqCst), 1);

        client.connect(Some("b2"), sink.clone());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(lock(&client.completed).as_deref(), Some("b2"));

        // b1 is no longer remembered, so asking for it again opens a channel
        client.connect(Some("b1"), sink);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(backend.status_calls.load(Ordering::SeqCst), 3);
        assert_eq!(completes(&lock(&events)), 3);
        assert_eq!(lock(&client.completed).as_deref(), Some("b1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disconnect_silences_channel_mid_delivery() {
        let backend = FakeBackend::new(
            vec![Ok(status(BatchState::Processing, 5, &["a", "b", "c", "d", "e"]))],
            Script::Refuse,
        );
        let client = StreamClient::with_policy(backend, true, Duration::from_millis(50));

        let delivered = Arc::new(AtomicUsize::new(0));
        let (first_tx, first_rx) = std::sync::mpsc::channel();
        let first_tx = Mutex::new(first_tx);
        let counter = delivered.clone();
        // a slow consumer keeps the channel task inside the result loop
        let sink: EventSink = Arc::new(move |event| {
            counter.fetch_add(1, Ordering::SeqCst);
            if matches!(event, StreamEvent::Result(_)) {
                let _ = lock(&first_tx).send(());
                std::thread::sleep(Duration::from_millis(100));
            }
        });

        client.connect(Some("b1"), sink);
        tokio::task::spawn_blocking(move || first_rx.recv())
            .await
            .unwrap()
            .unwrap();
        client.disconnect();
        let at_disconnect = delivered.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), at_disconnect);
        let status = client.status();
        assert_eq!(status.state, ChannelState::Idle);
        assert_eq!(status.batch_id, None);
        assert_eq!(status.last_error, None);
    }
}
