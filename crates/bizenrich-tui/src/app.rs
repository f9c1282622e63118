use std::path::PathBuf;
use std::time::{Duration, Instant};

use bizenrich_core::{
    AppStatus, BatchMonitor, BatchStatus, ChannelState, ConnectionStatus, HealthReport,
    KeyValueStore, ResultRecord, ResumeOutcome, SessionStore, Signal, StreamEvent, Timing,
};
use bizenrich_reporting::{ExportFormat, ResultStats};

use crate::action::Action;
use crate::input::InputMode;
use crate::model::results::{self, SortOrder};
use crate::model::upload::UploadForm;
use crate::theme::Theme;
use crate::tui_event::BackendEvent;

const HEALTH_INTERVAL: Duration = Duration::from_secs(30);
const NOTICE_TTL: Duration = Duration::from_secs(6);

pub type Session = SessionStore<Box<dyn KeyValueStore + Send>>;

/// Which screen is currently displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Upload,
    Processing,
    Complete,
    Error,
    /// The record named by `App::detail_key`.
    Detail,
}

/// Work the app wants done; executed by the backend outside of `update`.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Upload(PathBuf),
    Attach(String),
    Detach,
    FetchFinal(String),
    ExportServer(String),
    ExportLocal {
        format: ExportFormat,
        records: Vec<ResultRecord>,
    },
    CheckHealth,
}

/// Main application state.
pub struct App {
    pub screen: Screen,
    pub status: AppStatus,
    pub batch_id: Option<String>,
    pub jobs_created: u64,
    pub monitor: BatchMonitor,
    /// Authoritative record set once the batch is complete.
    pub final_results: Vec<ResultRecord>,
    pub stats: Option<ResultStats>,
    pub upload: UploadForm,
    pub error_message: Option<String>,
    /// Latest non-fatal stream problem (degraded channel, failed poll).
    pub advisory: Option<String>,
    pub notice: Option<(String, Instant)>,
    pub connection: ConnectionStatus,
    pub stuck: bool,
    pub fetching_final: bool,
    pub health: Option<HealthReport>,
    next_health_check: Option<Instant>,
    pub cursor: usize,
    pub sort_order: SortOrder,
    pub tick: usize,
    pub theme: Theme,
    pub should_quit: bool,
    pub show_help: bool,
    pub detail_scroll: u16,
    /// Identity key of the record shown on the detail screen.
    pub detail_key: Option<String>,
    /// Height of the visible table area (set on resize, used for page up/down).
    pub visible_rows: usize,
    session: Session,
    commands: Vec<Command>,
}

impl App {
    pub fn new(session: Session, timing: Timing) -> Self {
        Self {
            screen: Screen::Upload,
            status: AppStatus::Idle,
            batch_id: None,
            jobs_created: 0,
            monitor: BatchMonitor::new(timing),
            final_results: Vec::new(),
            stats: None,
            upload: UploadForm::default(),
            error_message: None,
            advisory: None,
            notice: None,
            connection: ConnectionStatus {
                batch_id: None,
                state: ChannelState::Idle,
                last_error: None,
            },
            stuck: false,
            fetching_final: false,
            health: None,
            next_health_check: None,
            cursor: 0,
            sort_order: SortOrder::default(),
            tick: 0,
            theme: Theme::terminal(),
            should_quit: false,
            show_help: false,
            detail_scroll: 0,
            detail_key: None,
            visible_rows: 20,
            session,
            commands: Vec::new(),
        }
    }

    /// Drain the commands queued since the last call.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn input_mode(&self) -> InputMode {
        if self.screen == Screen::Upload && self.status != AppStatus::Uploading && !self.show_help
        {
            InputMode::Text
        } else {
            InputMode::Normal
        }
    }

    /// Results in display order: the final set once complete, otherwise
    /// what the reconciler has accepted so far.
    pub fn rows(&self) -> Vec<&ResultRecord> {
        if self.status == AppStatus::Complete {
            results::sorted(self.final_results.iter(), self.sort_order)
        } else {
            match self.monitor.reconciler() {
                Some(r) => results::sorted(r.results(), self.sort_order),
                None => Vec::new(),
            }
        }
    }

    /// Record shown on the detail screen; looked up by key so that results
    /// arriving meanwhile do not change it.
    pub fn detail_record(&self) -> Option<&ResultRecord> {
        let key = self.detail_key.as_deref()?;
        if self.status == AppStatus::Complete {
            self.final_results.iter().find(|r| r.identity_key() == key)
        } else {
            self.monitor
                .reconciler()?
                .results()
                .find(|r| r.identity_key() == key)
        }
    }

    /// The list screen for the current status.
    fn base_screen(&self) -> Screen {
        match self.status {
            AppStatus::Idle | AppStatus::Uploading => Screen::Upload,
            AppStatus::Processing => Screen::Processing,
            AppStatus::Complete => Screen::Complete,
            AppStatus::Error => Screen::Error,
        }
    }

    fn on_list(&self) -> bool {
        matches!(self.screen, Screen::Processing | Screen::Complete)
    }

    /// Process a user action and update state. Returns true if the app should quit.
    pub fn update(&mut self, action: Action) -> bool {
        self.update_at(action, Instant::now())
    }

    fn update_at(&mut self, action: Action, now: Instant) -> bool {
        // When help overlay is shown, only allow a few actions through
        if self.show_help {
            match action {
                Action::Quit => {
                    self.should_quit = true;
                    return true;
                }
                Action::ToggleHelp | Action::NavigateBack => self.show_help = false,
                Action::Tick => self.on_tick(now),
                Action::Resize(_w, h) => self.visible_rows = (h as usize).saturating_sub(8),
                _ => {}
            }
            return false;
        }

        let (row_count, selected_key) = {
            let rows = self.rows();
            (rows.len(), rows.get(self.cursor).map(|r| r.identity_key()))
        };
        match action {
            Action::Quit => {
                self.should_quit = true;
                return true;
            }
            Action::ToggleHelp => self.show_help = true,
            Action::Input(c) => {
                if self.input_mode() == InputMode::Text {
                    self.upload.push(c);
                }
            }
            Action::Backspace => {
                if self.input_mode() == InputMode::Text {
                    self.upload.pop();
                }
            }
            Action::Submit => {
                if self.input_mode() == InputMode::Text {
                    self.start_upload();
                }
            }
            Action::NavigateBack => {
                if self.screen == Screen::Detail {
                    self.screen = self.base_screen();
                    self.detail_key = None;
                }
            }
            Action::DrillIn => {
                if self.on_list() && selected_key.is_some() {
                    self.detail_scroll = 0;
                    self.detail_key = selected_key;
                    self.screen = Screen::Detail;
                }
            }
            Action::MoveDown => match self.screen {
                Screen::Detail => self.detail_scroll = self.detail_scroll.saturating_add(1),
                _ if self.on_list() => {
                    if self.cursor + 1 < row_count {
                        self.cursor += 1;
                    }
                }
                _ => {}
            },
            Action::MoveUp => match self.screen {
                Screen::Detail => self.detail_scroll = self.detail_scroll.saturating_sub(1),
                _ => self.cursor = self.cursor.saturating_sub(1),
            },
            Action::PageDown => {
                let page = self.visible_rows.max(1);
                match self.screen {
                    Screen::Detail => {
                        self.detail_scroll = self.detail_scroll.saturating_add(page as u16)
                    }
                    _ => self.cursor = (self.cursor + page).min(row_count.saturating_sub(1)),
                }
            }
            Action::PageUp => {
                let page = self.visible_rows.max(1);
                match self.screen {
                    Screen::Detail => {
                        self.detail_scroll = self.detail_scroll.saturating_sub(page as u16)
                    }
                    _ => self.cursor = self.cursor.saturating_sub(page),
                }
            }
            Action::GoTop => match self.screen {
                Screen::Detail => self.detail_scroll = 0,
                _ => self.cursor = 0,
            },
            Action::GoBottom => match self.screen {
                Screen::Detail => self.detail_scroll = u16::MAX, // clamped by Paragraph rendering
                _ => self.cursor = row_count.saturating_sub(1),
            },
            Action::CycleSort => {
                if self.on_list() {
                    self.sort_order = self.sort_order.next();
                    self.cursor = 0;
                }
            }
            Action::Retry => {
                if self.screen == Screen::Error {
                    self.reset();
                }
            }
            Action::NewSearch => {
                if matches!(
                    self.screen,
                    Screen::Processing | Screen::Complete | Screen::Error
                ) {
                    self.reset();
                }
            }
            Action::ExportServer => {
                if self.status == AppStatus::Complete {
                    if let Some(id) = &self.batch_id {
                        self.commands.push(Command::ExportServer(id.clone()));
                    }
                }
            }
            Action::ExportCsv | Action::ExportJson => {
                if self.status == AppStatus::Complete {
                    let format = if action == Action::ExportCsv {
                        ExportFormat::Csv
                    } else {
                        ExportFormat::Json
                    };
                    self.commands.push(Command::ExportLocal {
                        format,
                        records: self.final_results.clone(),
                    });
                }
            }
            Action::Tick => self.on_tick(now),
            Action::Resize(_w, h) => {
                // Rough estimate: total height minus header/progress/footer/borders
                self.visible_rows = (h as usize).saturating_sub(8);
            }
            Action::None => {}
        }
        false
    }

    fn on_tick(&mut self, now: Instant) {
        self.tick = self.tick.wrapping_add(1);
        if self.status == AppStatus::Processing {
            let signals = self.monitor.tick(now);
            self.handle_signals(signals);
        }
        if self.next_health_check.is_none_or(|due| now >= due) {
            self.next_health_check = Some(now + HEALTH_INTERVAL);
            self.commands.push(Command::CheckHealth);
        }
        if self
            .notice
            .as_ref()
            .is_some_and(|(_, at)| now.duration_since(*at) >= NOTICE_TTL)
        {
            self.notice = None;
        }
    }

    fn start_upload(&mut self) {
        match self.upload.validate() {
            Ok(path) => {
                log::info!("uploading {}", path.display());
                self.status = AppStatus::Uploading;
                self.error_message = None;
                self.persist();
                self.commands.push(Command::Upload(path));
            }
            Err(message) => self.upload.error = Some(message),
        }
    }

    /// Drop the batch and everything learned about it, then return to the
    /// upload screen.
    fn reset(&mut self) {
        if let Some(id) = &self.batch_id {
            log::info!("abandoning batch {id}");
        }
        self.commands.push(Command::Detach);
        self.monitor.reset();
        self.batch_id = None;
        self.jobs_created = 0;
        self.status = AppStatus::Idle;
        self.final_results.clear();
        self.stats = None;
        self.error_message = None;
        self.advisory = None;
        self.stuck = false;
        self.fetching_final = false;
        self.cursor = 0;
        self.upload.clear();
        self.screen = Screen::Upload;
        self.persist();
    }

    fn persist(&mut self) {
        if let Err(e) = self.session.save(self.batch_id.as_deref(), self.status) {
            log::warn!("failed to persist session: {e}");
        }
    }

    fn notify(&mut self, message: String, now: Instant) {
        self.notice = Some((message, now));
    }

    /// Process a backend event and update model state.
    pub fn handle_backend_event(&mut self, event: BackendEvent) {
        self.handle_backend_event_at(event, Instant::now());
    }

    fn handle_backend_event_at(&mut self, event: BackendEvent, now: Instant) {
        match event {
            BackendEvent::Uploaded(result) => {
                if self.status != AppStatus::Uploading {
                    log::debug!("ignoring upload result after reset");
                    return;
                }
                match result {
                    Ok(response) => {
                        log::info!(
                            "batch {} created with {} jobs",
                            response.batch_id,
                            response.jobs_created
                        );
                        self.begin_monitoring(response.batch_id, response.jobs_created, None, now);
                    }
                    Err(e) => self.fail(e.to_string()),
                }
            }
            BackendEvent::Stream(event) => {
                if self.status != AppStatus::Processing {
                    return;
                }
                match &event {
                    StreamEvent::Connected => self.advisory = None,
                    StreamEvent::Error(err) => self.advisory = Some(err.message.clone()),
                    _ => {}
                }
                let signals = self.monitor.apply(&event, now);
                self.handle_signals(signals);
            }
            BackendEvent::FinalResults { batch_id, result } => {
                if self.batch_id.as_deref() != Some(batch_id.as_str())
                    || self.status != AppStatus::Processing
                {
                    return;
                }
                self.fetching_final = false;
                match result {
                    Ok(status) => self.finish(status.results),
                    Err(e) => {
                        log::warn!("final fetch for batch {batch_id} failed: {e}");
                        let received: Vec<ResultRecord> = self
                            .monitor
                            .reconciler()
                            .map(|r| r.results().cloned().collect())
                            .unwrap_or_default();
                        self.finish(received);
                        self.notify(
                            format!("Could not fetch final results ({e}); showing live results"),
                            now,
                        );
                    }
                }
            }
            BackendEvent::Resumed(outcome) => {
                if self.status != AppStatus::Idle || self.batch_id.is_some() {
                    return;
                }
                match outcome {
                    ResumeOutcome::Monitor { batch_id, status } => {
                        let total = status.expected_total();
                        self.begin_monitoring(batch_id, total, Some(&status), now);
                    }
                    ResumeOutcome::Finished(status) => {
                        self.notify(
                            format!("Batch {} finished while you were away", status.batch_id),
                            now,
                        );
                        self.batch_id = Some(status.batch_id);
                        self.jobs_created = status.progress.total;
                        self.finish(status.results);
                    }
                    ResumeOutcome::Fresh { reason } => {
                        if let Err(e) = self.session.clear() {
                            log::warn!("failed to clear session: {e}");
                        }
                        self.notify(format!("Could not resume previous batch: {reason}"), now);
                    }
                }
            }
            BackendEvent::Exported(result) => {
                let message = match result {
                    Ok(path) => format!("Saved {}", path.display()),
                    Err(e) => format!("Export failed: {e}"),
                };
                self.notify(message, now);
            }
            BackendEvent::Health(report) => self.health = Some(report),
        }
    }

    fn begin_monitoring(
        &mut self,
        batch_id: String,
        total: u64,
        snapshot: Option<&BatchStatus>,
        now: Instant,
    ) {
        self.monitor.attach(Some(&batch_id), total, now);
        if let (Some(snapshot), Some(reconciler)) = (snapshot, self.monitor.reconciler_mut()) {
            reconciler.absorb(snapshot, now);
        }
        self.jobs_created = total;
        self.status = AppStatus::Processing;
        self.screen = Screen::Processing;
        self.cursor = 0;
        self.advisory = None;
        self.commands.push(Command::Attach(batch_id.clone()));
        self.batch_id = Some(batch_id);
        self.persist();
    }

    fn handle_signals(&mut self, signals: Vec<Signal>) {
        for signal in signals {
            match signal {
                Signal::Completed(completion) => {
                    if self.fetching_final {
                        continue;
                    }
                    if let Some(id) = self.batch_id.clone() {
                        log::info!(
                            "batch {id} done ({}/{}), fetching final results",
                            completion.completed,
                            completion.total
                        );
                        self.fetching_final = true;
                        self.commands.push(Command::FetchFinal(id));
                    }
                }
                Signal::PossiblyStuck => {}
            }
        }
        self.stuck = self
            .monitor
            .reconciler()
            .is_some_and(|r| r.possibly_stuck());
    }

    fn finish(&mut self, records: Vec<ResultRecord>) {
        self.stats = Some(ResultStats::from_records(&records));
        self.final_results = records;
        self.status = AppStatus::Complete;
        self.screen = Screen::Complete;
        self.cursor = 0;
        self.stuck = false;
        self.advisory = None;
        self.commands.push(Command::Detach);
        self.persist();
    }

    fn fail(&mut self, message: String) {
        log::warn!("upload failed: {message}");
        self.error_message = Some(message);
        self.status = AppStatus::Error;
        self.screen = Screen::Error;
        self.persist();
    }

    /// Render the current screen.
    pub fn view(&self, f: &mut ratatui::Frame) {
        match self.screen {
            Screen::Upload => crate::view::upload::render(f, self),
            Screen::Processing => crate::view::processing::render(f, self),
            Screen::Complete => crate::view::complete::render(f, self),
            Screen::Error => crate::view::error::render(f, self),
            Screen::Detail => crate::view::detail::render(f, self),
        }

        if self.show_help {
            crate::view::help::render(f, &self.theme);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizenrich_core::{
        ApiError, BatchProgress, BatchState, MemoryStore, OriginalData, UploadResponse,
    };

    fn app() -> App {
        App::new(SessionStore::new(Box::new(MemoryStore::new())), Timing::default())
    }

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

    fn batch(id: &str, state: BatchState, jobs: &[&str]) -> BatchStatus {
        BatchStatus {
            batch_id: id.into(),
            status: state,
            progress: BatchProgress {
                total: jobs.len() as u64,
                completed: jobs.len() as u64,
                ..Default::default()
            },
            results: jobs.iter().map(|j| record(j)).collect(),
            summary: None,
            total_jobs: None,
        }
    }

    /// Drive the app through a successful upload of batch `b1`.
    fn uploaded(app: &mut App, jobs: u64, now: Instant) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.csv");
        std::fs::write(&path, "name\n").unwrap();
        for c in path.display().to_string().chars() {
            app.update_at(Action::Input(c), now);
        }
        app.update_at(Action::Submit, now);
        assert_eq!(app.status, AppStatus::Uploading);
        assert_eq!(app.take_commands(), vec![Command::Upload(path)]);

        app.handle_backend_event_at(
            BackendEvent::Uploaded(Ok(UploadResponse {
                batch_id: "b1".into(),
                jobs_created: jobs,
                message: String::new(),
            })),
            now,
        );
    }

    fn stream(app: &mut App, event: StreamEvent, now: Instant) {
        app.handle_backend_event_at(BackendEvent::Stream(event), now);
    }

    #[test]
    fn upload_attaches_stream_and_persists_session() {
        let t0 = Instant::now();
        let mut app = app();
        uploaded(&mut app, 3, t0);

        assert_eq!(app.screen, Screen::Processing);
        assert_eq!(app.take_commands(), vec![Command::Attach("b1".into())]);
        assert_eq!(app.session.load().map(|t| t.batch_id), Some("b1".to_string()));
    }

    #[test]
    fn deduplicated_completion_fetches_final_results_once() {
        let t0 = Instant::now();
        let mut app = app();
        uploaded(&mut app, 3, t0);
        app.take_commands();

        for job in ["a", "b", "b", "c"] {
            stream(&mut app, StreamEvent::Result(Box::new(record(job))), t0);
        }
        assert_eq!(app.rows().len(), 3);
        stream(
            &mut app,
            StreamEvent::Complete {
                completed: 3,
                total: 3,
            },
            t0,
        );
        app.update_at(Action::Tick, t0 + Duration::from_secs(1));
        let fetches = app
            .take_commands()
            .into_iter()
            .filter(|c| matches!(c, Command::FetchFinal(_)))
            .count();
        assert_eq!(fetches, 1);

        app.handle_backend_event_at(
            BackendEvent::FinalResults {
                batch_id: "b1".into(),
                result: Ok(batch("b1", BatchState::Completed, &["a", "b", "c"])),
            },
            t0,
        );
        assert_eq!(app.screen, Screen::Complete);
        assert_eq!(app.status, AppStatus::Complete);
        assert_eq!(app.stats.as_ref().map(|s| s.total), Some(3));
        assert!(app.take_commands().contains(&Command::Detach));
        assert_eq!(app.session.load(), None, "complete batches are not resumed");
    }

    #[test]
    fn failed_final_fetch_keeps_live_results() {
        let t0 = Instant::now();
        let mut app = app();
        uploaded(&mut app, 1, t0);
        stream(&mut app, StreamEvent::Result(Box::new(record("a"))), t0);
        stream(
            &mut app,
            StreamEvent::Complete {
                completed: 1,
                total: 1,
            },
            t0,
        );
        app.handle_backend_event_at(
            BackendEvent::FinalResults {
                batch_id: "b1".into(),
                result: Err(ApiError::Timeout),
            },
            t0,
        );
        assert_eq!(app.status, AppStatus::Complete);
        assert_eq!(app.final_results.len(), 1);
        assert!(app.notice.is_some());
    }

    #[test]
    fn upload_error_then_retry_resets_everything() {
        let t0 = Instant::now();
        let mut app = app();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.csv");
        std::fs::write(&path, "name\n").unwrap();
        app.upload.input = path.display().to_string();
        app.update_at(Action::Submit, t0);
        app.handle_backend_event_at(BackendEvent::Uploaded(Err(ApiError::PayloadTooLarge)), t0);

        assert_eq!(app.screen, Screen::Error);
        assert!(app.error_message.as_deref().is_some_and(|m| m.contains("too large")));

        app.update_at(Action::Retry, t0);
        assert_eq!(app.screen, Screen::Upload);
        assert_eq!(app.status, AppStatus::Idle);
        assert!(app.upload.input.is_empty());
        assert_eq!(app.session.store().get(bizenrich_core::session::STATUS_KEY), None);
    }

    #[test]
    fn new_search_while_processing_drops_batch() {
        let t0 = Instant::now();
        let mut app = app();
        uploaded(&mut app, 3, t0);
        stream(&mut app, StreamEvent::Result(Box::new(record("a"))), t0);
        app.take_commands();

        app.update_at(Action::NewSearch, t0);
        assert_eq!(app.take_commands(), vec![Command::Detach]);
        assert!(app.monitor.reconciler().is_none());
        assert_eq!(app.session.load(), None);

        // late events from the abandoned batch change nothing
        stream(&mut app, StreamEvent::Result(Box::new(record("b"))), t0);
        app.handle_backend_event_at(
            BackendEvent::FinalResults {
                batch_id: "b1".into(),
                result: Ok(batch("b1", BatchState::Completed, &["a"])),
            },
            t0,
        );
        assert_eq!(app.screen, Screen::Upload);
    }

    #[test]
    fn stuck_advisory_shows_after_silence() {
        let t0 = Instant::now();
        let mut app = app();
        uploaded(&mut app, 3, t0);
        app.update_at(Action::Tick, t0 + Duration::from_secs(6));
        assert!(app.stuck);
        assert_eq!(app.status, AppStatus::Processing);
    }

    #[test]
    fn resumed_finished_batch_skips_stream() {
        let t0 = Instant::now();
        let mut app = app();
        app.handle_backend_event_at(
            BackendEvent::Resumed(ResumeOutcome::Finished(batch(
                "b2",
                BatchState::Completed,
                &["a", "b"],
            ))),
            t0,
        );
        assert_eq!(app.screen, Screen::Complete);
        assert_eq!(app.batch_id.as_deref(), Some("b2"));
        assert_eq!(app.final_results.len(), 2);
        let commands = app.take_commands();
        assert!(!commands.iter().any(|c| matches!(c, Command::Attach(_))));
    }

    #[test]
    fn resumed_running_batch_starts_from_snapshot() {
        let t0 = Instant::now();
        let mut app = app();
        let mut snapshot = batch("b2", BatchState::Processing, &["a"]);
        snapshot.progress.total = 4;
        app.handle_backend_event_at(
            BackendEvent::Resumed(ResumeOutcome::Monitor {
                batch_id: "b2".into(),
                status: snapshot,
            }),
            t0,
        );
        assert_eq!(app.screen, Screen::Processing);
        assert_eq!(app.monitor.progress().completed, 1);
        assert_eq!(app.monitor.progress().total, 4);
        assert_eq!(app.take_commands(), vec![Command::Attach("b2".into())]);
    }

    #[test]
    fn local_export_only_when_complete() {
        let t0 = Instant::now();
        let mut app = app();
        app.update_at(Action::ExportCsv, t0);
        assert!(app.take_commands().is_empty());

        app.handle_backend_event_at(
            BackendEvent::Resumed(ResumeOutcome::Finished(batch(
                "b2",
                BatchState::Completed,
                &["a"],
            ))),
            t0,
        );
        app.take_commands();
        app.update_at(Action::ExportJson, t0);
        app.update_at(Action::ExportServer, t0);
        let commands = app.take_commands();
        assert!(matches!(
            &commands[0],
            Command::ExportLocal { format: ExportFormat::Json, records } if records.len() == 1
        ));
        assert_eq!(commands[1], Command::ExportServer("b2".into()));
    }

    #[test]
    fn health_is_checked_periodically() {
        let t0 = Instant::now();
        let mut app = app();
        app.update_at(Action::Tick, t0);
        app.update_at(Action::Tick, t0 + Duration::from_secs(10));
        app.update_at(Action::Tick, t0 + Duration::from_secs(31));
        let checks = app
            .take_commands()
            .into_iter()
            .filter(|c| *c == Command::CheckHealth)
            .count();
        assert_eq!(checks, 2);
    }
}
