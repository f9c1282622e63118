use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ratatui::Terminal;
use ratatui::crossterm::event;
use ratatui::crossterm::execute;
use ratatui::crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::CrosstermBackend;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use bizenrich_core::config::ConfigFile;
use bizenrich_core::{ApiClient, Config, FileStore, KeyValueStore, SessionStore, Timing};

mod action;
mod app;
mod backend;
mod input;
mod model;
mod theme;
mod tui_event;
mod view;

use app::App;
use backend::Backend;

/// Bizenrich TUI: upload a CSV of businesses and watch them get enriched.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// CSV file to upload right away
    csv_path: Option<PathBuf>,

    /// Backend root URL (default http://localhost:3000)
    #[arg(long)]
    backend_url: Option<String>,

    /// Transport policy: auto, live or polling
    #[arg(long)]
    transport: Option<String>,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the session snapshot and the log file
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Directory exports are written to (default: current directory)
    #[arg(long)]
    export_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Some(path) = &args.csv_path {
        if !path.exists() {
            anyhow::bail!("CSV file not found: {}", path.display());
        }
    }

    let state_dir = resolve_state_dir(args.state_dir.clone())?;
    init_logging(&state_dir);

    // CLI flags > env vars > config file > defaults
    let mut config = Config::default();
    let config_path = args.config.clone().or_else(default_config_path);
    if let Some(path) = config_path.filter(|p| args.config.is_some() || p.exists()) {
        ConfigFile::load(&path)
            .and_then(|file| file.apply(&mut config))
            .with_context(|| format!("config file {}", path.display()))?;
    }
    config.apply_env()?;
    if let Some(url) = &args.backend_url {
        config.set_backend_url(url)?;
    }
    if let Some(transport) = &args.transport {
        config.transport = transport.parse()?;
    }
    log::info!(
        "backend {} (transport {:?}, polling preferred: {})",
        config.backend_url,
        config.transport,
        config.prefers_polling()
    );

    let export_dir = match args.export_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let store: Box<dyn KeyValueStore + Send> =
        Box::new(FileStore::open(state_dir.join("session.json")));
    let session = SessionStore::new(store);
    // A CSV on the command line wins over resuming the previous batch.
    let ticket = if args.csv_path.is_none() {
        session.load()
    } else {
        None
    };

    let api = ApiClient::new(&config)?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let backend = Backend::new(api, &config, tx, export_dir);

    // Initialize terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    // Install panic hook that restores terminal before printing panic
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    // Drain any stray input events (e.g. Enter keypress from launching the command)
    while event::poll(Duration::from_millis(50)).unwrap_or(false) {
        let _ = event::read();
    }

    let mut app = App::new(session, Timing::from(&config));
    if let Ok(size) = terminal.size() {
        app.update(action::Action::Resize(size.width, size.height));
    }

    if let Some(ticket) = ticket {
        backend.resume(ticket);
    } else if let Some(path) = &args.csv_path {
        for c in path.display().to_string().chars() {
            app.update(action::Action::Input(c));
        }
        app.update(action::Action::Submit);
    }

    // Also handle Ctrl+C at the OS level for clean shutdown
    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_for_signal.cancel();
        }
    });

    let tick_rate = Duration::from_millis(100);

    loop {
        app.connection = backend.connection();
        terminal.draw(|f| app.view(f))?;

        tokio::select! {
            maybe_event = rx.recv() => {
                if let Some(backend_event) = maybe_event {
                    app.handle_backend_event(backend_event);
                    // Drain any additional queued backend events
                    while let Ok(evt) = rx.try_recv() {
                        app.handle_backend_event(evt);
                    }
                }
            }
            _ = async {
                if event::poll(tick_rate).unwrap_or(false) {
                    if let Ok(evt) = event::read() {
                        let action = input::map_event(&evt, app.input_mode());
                        app.update(action);
                    }
                }
            } => {}
            _ = cancel.cancelled() => app.should_quit = true,
        }

        app.update(action::Action::Tick);

        for command in app.take_commands() {
            backend.execute(command);
        }

        if app.should_quit {
            break;
        }
    }

    // The session snapshot is kept so the next start can resume.
    backend.shutdown();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    Ok(())
}

fn resolve_state_dir(flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let dir = flag
        .or_else(|| std::env::var_os("BIZENRICH_STATE_DIR").map(PathBuf::from))
        .or_else(|| dirs::data_local_dir().map(|d| d.join("bizenrich")))
        .context("no state directory available; pass --state-dir")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create state directory {}", dir.display()))?;
    Ok(dir)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bizenrich").join("config.toml"))
}

/// Log to `<state dir>/bizenrich.log`; the terminal belongs to the UI.
fn init_logging(state_dir: &Path) {
    let path = state_dir.join("bizenrich.log");
    let file = match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => file,
        Err(_) => return,
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
}
