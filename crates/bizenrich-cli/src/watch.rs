//! Follow one batch from the terminal until it completes.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::{mpsc, watch};

use bizenrich_core::model::{BatchStatus, ResultRecord};
use bizenrich_core::{
    ApiClient, ApiError, AppStatus, BatchMonitor, Completion, ConnectionStatus, FileStore,
    KeyValueStore, ProgressState, SessionStore, Signal, StreamClient, StreamEvent, Timing,
};

use crate::output::{self, Palette};

const TICK: Duration = Duration::from_millis(100);

pub type Session = SessionStore<FileStore>;

pub enum WatchOutcome {
    /// The authoritative record set, or what arrived live when it could not
    /// be fetched.
    Finished(Vec<ResultRecord>),
    /// Ctrl-C; the session snapshot is kept so the batch can be resumed.
    Interrupted,
}

/// Where to start following a batch from.
pub struct WatchStart<'a> {
    pub batch_id: &'a str,
    /// Job count from the upload response or a status snapshot; 0 if unknown.
    pub total: u64,
    pub snapshot: Option<&'a BatchStatus>,
}

pub async fn watch<S: KeyValueStore>(
    api: Arc<ApiClient>,
    session: &mut SessionStore<S>,
    start: WatchStart<'_>,
    palette: Palette,
) -> anyhow::Result<WatchOutcome> {
    let config = api.config();
    let batch_id = start.batch_id;
    let mut monitor = BatchMonitor::new(Timing::from(config));
    let now = Instant::now();
    monitor.attach(Some(batch_id), start.total, now);
    if let (Some(snapshot), Some(reconciler)) = (start.snapshot, monitor.reconciler_mut()) {
        reconciler.absorb(snapshot, now);
    }
    persist(session, Some(batch_id), AppStatus::Processing);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let stream = StreamClient::new(api.clone(), config);
    stream.connect(
        Some(batch_id),
        Arc::new(move |event| {
            let _ = tx.send(event);
        }),
    );
    let mut connection = stream.subscribe();

    let pb = make_progress_bar();
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };
    let followed = follow_events(
        &mut rx,
        &mut connection,
        &mut monitor,
        &pb,
        palette,
        interrupt,
    )
    .await;
    stream.disconnect();

    let Some(completion) = followed else {
        pb.abandon_with_message("interrupted");
        eprintln!(
            "{} resume with `bizenrich watch {batch_id}`",
            palette.warn("Interrupted;")
        );
        return Ok(WatchOutcome::Interrupted);
    };

    pb.finish_with_message("done");
    log::info!(
        "batch {batch_id} complete ({}/{}), fetching final results",
        completion.completed,
        completion.total
    );

    let fetched = api.batch_status(batch_id).await;
    let records = final_records(batch_id, fetched, &monitor, palette);
    persist(session, Some(batch_id), AppStatus::Complete);
    output::print_summary(palette, batch_id, &records);
    Ok(WatchOutcome::Finished(records))
}

/// Feed stream events into `monitor` until it signals completion. Returns
/// `None` when `interrupt` resolves first.
async fn follow_events(
    rx: &mut mpsc::UnboundedReceiver<StreamEvent>,
    connection: &mut watch::Receiver<ConnectionStatus>,
    monitor: &mut BatchMonitor,
    pb: &ProgressBar,
    palette: Palette,
    interrupt: impl Future<Output = ()>,
) -> Option<Completion> {
    tokio::pin!(interrupt);
    update_bar(pb, monitor.progress());
    let mut ticker = tokio::time::interval(TICK);

    loop {
        let signals = tokio::select! {
            Some(event) = rx.recv() => {
                report_event(pb, palette, &event);
                monitor.apply(&event, Instant::now())
            }
            _ = ticker.tick() => monitor.tick(Instant::now()),
            Ok(()) = connection.changed() => {
                let state = connection.borrow_and_update().state;
                pb.set_message(state.label().to_string());
                Vec::new()
            }
            _ = &mut interrupt => return None,
        };
        update_bar(pb, monitor.progress());

        let mut done = None;
        for signal in signals {
            match signal {
                Signal::Completed(completion) => done = Some(completion),
                Signal::PossiblyStuck => pb.println(palette.warn(
                    "  No data received yet. The batch may already be complete.",
                )),
            }
        }
        if done.is_some() {
            return done;
        }
    }
}

/// The fetched record set, or the live one when the fetch failed.
fn final_records(
    batch_id: &str,
    fetched: Result<BatchStatus, ApiError>,
    monitor: &BatchMonitor,
    palette: Palette,
) -> Vec<ResultRecord> {
    match fetched {
        Ok(status) => status.results,
        Err(e) => {
            log::warn!("final fetch for batch {batch_id} failed: {e}");
            eprintln!(
                "{} could not fetch final results ({e}); showing live results",
                palette.warn("warning:")
            );
            monitor
                .reconciler()
                .map(|r| r.results().cloned().collect())
                .unwrap_or_default()
        }
    }
}

pub fn persist<S: KeyValueStore>(
    session: &mut SessionStore<S>,
    batch_id: Option<&str>,
    status: AppStatus,
) {
    if let Err(e) = session.save(batch_id, status) {
        log::warn!("failed to persist session: {e}");
    }
}

fn report_event(pb: &ProgressBar, palette: Palette, event: &StreamEvent) {
    match event {
        StreamEvent::Result(record) => pb.println(output::result_line(palette, record)),
        StreamEvent::Error(err) => pb.println(format!("  {}", palette.warn(&err.message))),
        _ => {}
    }
}

fn make_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{elapsed_precise}] {bar:30.green/white} {pos}/{len} businesses {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn update_bar(pb: &ProgressBar, progress: ProgressState) {
    if progress.total > 0 {
        pb.set_length(progress.total);
    }
    pb.set_position(progress.completed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizenrich_core::model::{BatchProgress, BatchState, OriginalData};
    use bizenrich_core::session::STATUS_KEY;
    use bizenrich_core::{ChannelState, MemoryStore};

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

    fn result(job: &str) -> StreamEvent {
        StreamEvent::Result(Box::new(record(job)))
    }

    fn attached(total: u64) -> BatchMonitor {
        let mut monitor = BatchMonitor::new(Timing::default());
        monitor.attach(Some("b1"), total, Instant::now());
        monitor
    }

    fn connecting_status() -> (watch::Sender<ConnectionStatus>, watch::Receiver<ConnectionStatus>) {
        watch::channel(ConnectionStatus {
            batch_id: Some("b1".into()),
            state: ChannelState::Connecting,
            last_error: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn complete_event_ends_the_loop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for event in [
            StreamEvent::Connected,
            StreamEvent::Progress {
                completed: Some(0),
                total: 3,
            },
            result("a"),
            result("a"),
            result("b"),
            StreamEvent::Complete {
                completed: 2,
                total: 3,
            },
        ] {
            tx.send(event).unwrap();
        }
        let (_status, mut connection) = connecting_status();
        let mut monitor = attached(0);
        let pb = ProgressBar::hidden();

        let completion = follow_events(
            &mut rx,
            &mut connection,
            &mut monitor,
            &pb,
            Palette::new(false),
            std::future::pending(),
        )
        .await;

        assert_eq!(
            completion,
            Some(Completion {
                completed: 2,
                total: 3
            })
        );
        assert_eq!(pb.position(), 2, "duplicates are counted once");
        assert_eq!(pb.length(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_stops_without_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(result("a")).unwrap();
        let (_status, mut connection) = connecting_status();
        let mut monitor = attached(5);

        let completion = follow_events(
            &mut rx,
            &mut connection,
            &mut monitor,
            &ProgressBar::hidden(),
            Palette::new(false),
            tokio::time::sleep(Duration::from_secs(1)),
        )
        .await;

        assert_eq!(completion, None);
        assert_eq!(monitor.progress().completed, 1);
    }

    #[test]
    fn failed_final_fetch_falls_back_to_live_results() {
        let mut monitor = attached(3);
        let now = Instant::now();
        monitor.apply(&result("a"), now);
        monitor.apply(&result("b"), now);

        let records = final_records("b1", Err(ApiError::Timeout), &monitor, Palette::new(false));
        let keys: Vec<String> = records.iter().map(|r| r.identity_key()).collect();
        assert_eq!(keys, ["job:a", "job:b"]);

        let fetched = BatchStatus {
            batch_id: "b1".into(),
            status: BatchState::Completed,
            progress: BatchProgress {
                total: 3,
                completed: 3,
                ..Default::default()
            },
            results: vec![record("a"), record("b"), record("c")],
            summary: None,
            total_jobs: None,
        };
        let records = final_records("b1", Ok(fetched), &monitor, Palette::new(false));
        assert_eq!(records.len(), 3, "the fetched set wins over live results");
    }

    #[test]
    fn completed_batch_is_not_resumable() {
        let mut session = SessionStore::new(MemoryStore::new());
        persist(&mut session, Some("b1"), AppStatus::Processing);
        assert_eq!(session.load().map(|t| t.batch_id).as_deref(), Some("b1"));

        persist(&mut session, Some("b1"), AppStatus::Complete);
        assert!(session.load().is_none());
        assert_eq!(session.store().get(STATUS_KEY).as_deref(), Some("complete"));
    }
}
