use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use bizenrich_core::config::ConfigFile;
use bizenrich_core::model::ResultRecord;
use bizenrich_core::{
    ApiClient, AppStatus, Config, CoreError, FileStore, ResumeOutcome, SessionStore,
};
use bizenrich_reporting::{ExportFormat, write_export};

mod output;
mod watch;

use output::Palette;
use watch::{Session, WatchOutcome, WatchStart};

/// Bizenrich: enrich a CSV of businesses with scraped contact data.
#[derive(Parser, Debug)]
#[command(name = "bizenrich", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend root URL (default http://localhost:3000)
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Transport policy: auto, live or polling
    #[arg(long, global = true)]
    transport: Option<String>,

    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the session snapshot
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a CSV file and create a batch
    Upload {
        csv: PathBuf,

        /// Follow the batch until it completes
        #[arg(short, long)]
        watch: bool,

        /// Write the final results to this file (.csv or .json); implies --watch
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Follow a batch until it completes (default: the batch of the last session)
    Watch {
        batch_id: Option<String>,

        /// Write the final results to this file (.csv or .json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the current status of a batch
    Status { batch_id: String },

    /// Download the backend's CSV export of a batch
    Export {
        batch_id: String,

        /// Output file or directory (default: current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check the API, Redis and worker health endpoints
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let palette = Palette::new(
        !cli.no_color && std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal(),
    );

    let config = resolve_config(&cli)?;
    let api = Arc::new(ApiClient::new(&config)?);

    match cli.command {
        Commands::Upload {
            csv,
            watch,
            output,
        } => {
            if !csv.exists() {
                anyhow::bail!("CSV file not found: {}", csv.display());
            }
            let mut session = open_session(cli.state_dir)?;
            watch::persist(&mut session, None, AppStatus::Uploading);
            let resp = match api.upload_csv(&csv).await {
                Ok(resp) => resp,
                Err(e) => {
                    watch::persist(&mut session, None, AppStatus::Error);
                    return Err(e).context("upload failed");
                }
            };
            output::print_upload(palette, &resp);

            if watch || output.is_some() {
                let start = WatchStart {
                    batch_id: &resp.batch_id,
                    total: resp.jobs_created,
                    snapshot: None,
                };
                let outcome = watch::watch(api, &mut session, start, palette).await?;
                save_output(outcome, output.as_deref())?;
            } else {
                // Left in the session so `bizenrich watch` picks it up.
                watch::persist(&mut session, Some(&resp.batch_id), AppStatus::Processing);
                println!("Follow it with `bizenrich watch {}`", resp.batch_id);
            }
        }
        Commands::Watch { batch_id, output } => {
            let mut session = open_session(cli.state_dir)?;
            let outcome = match batch_id {
                Some(id) => {
                    let status = api
                        .batch_status(&id)
                        .await
                        .with_context(|| format!("failed to look up batch {id}"))?;
                    follow(api, &mut session, status, palette).await?
                }
                None => match session.restore(api.as_ref()).await {
                    None => anyhow::bail!("no batch to resume; pass a batch id"),
                    Some(ResumeOutcome::Fresh { reason }) => {
                        anyhow::bail!("cannot resume previous batch: {reason}")
                    }
                    Some(ResumeOutcome::Monitor { status, .. })
                    | Some(ResumeOutcome::Finished(status)) => {
                        follow(api, &mut session, status, palette).await?
                    }
                },
            };
            save_output(outcome, output.as_deref())?;
        }
        Commands::Status { batch_id } => {
            let status = api.batch_status(&batch_id).await?;
            output::print_status(palette, &status);
        }
        Commands::Export { batch_id, output } => {
            let (filename, bytes) = api.export_csv(&batch_id).await?;
            let path = export_target(output.as_deref(), &filename)?;
            std::fs::write(&path, bytes)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("{} {}", palette.good("Saved"), path.display());
        }
        Commands::Health => {
            let report = api.health().await;
            output::print_health(palette, &report);
            if !report.all_up() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Watch a batch from a status snapshot; one that is already finished is
/// summarized directly.
async fn follow(
    api: Arc<ApiClient>,
    session: &mut Session,
    status: bizenrich_core::BatchStatus,
    palette: Palette,
) -> anyhow::Result<WatchOutcome> {
    if status.status.is_terminal() {
        watch::persist(session, Some(&status.batch_id), AppStatus::Complete);
        output::print_summary(palette, &status.batch_id, &status.results);
        return Ok(WatchOutcome::Finished(status.results));
    }
    let start = WatchStart {
        batch_id: &status.batch_id,
        total: status.expected_total(),
        snapshot: Some(&status),
    };
    watch::watch(api, session, start, palette).await
}

// CLI flags > env vars > config file > defaults
fn resolve_config(cli: &Cli) -> Result<Config, CoreError> {
    let mut config = Config::default();
    let path = cli.config.clone().or_else(|| {
        dirs::config_dir()
            .map(|d| d.join("bizenrich").join("config.toml"))
            .filter(|p| p.exists())
    });
    if let Some(path) = path {
        ConfigFile::load(&path)
            .and_then(|file| file.apply(&mut config))
            .map_err(|source| CoreError::ConfigFile {
                path: path.clone(),
                source,
            })?;
    }
    config.apply_env()?;
    if let Some(url) = &cli.backend_url {
        config.set_backend_url(url)?;
    }
    if let Some(transport) = &cli.transport {
        config.transport = transport.parse()?;
    }
    Ok(config)
}

fn open_session(flag: Option<PathBuf>) -> anyhow::Result<Session> {
    let dir = flag
        .or_else(|| std::env::var_os("BIZENRICH_STATE_DIR").map(PathBuf::from))
        .or_else(|| dirs::data_local_dir().map(|d| d.join("bizenrich")))
        .context("no state directory available; pass --state-dir")?;
    let store = FileStore::open(dir.join("session.json"));
    log::debug!("session file {}", store.path().display());
    Ok(SessionStore::new(store))
}

fn save_output(outcome: WatchOutcome, output: Option<&Path>) -> anyhow::Result<()> {
    let (WatchOutcome::Finished(records), Some(path)) = (outcome, output) else {
        return Ok(());
    };
    write_results(path, &records)?;
    println!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

fn write_results(path: &Path, records: &[ResultRecord]) -> anyhow::Result<()> {
    let format = format_for(path);
    write_export(path, format, records)
        .with_context(|| format!("failed to write {}", path.display()))
}

/// JSON for `.json` files, CSV for everything else.
fn format_for(path: &Path) -> ExportFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => ExportFormat::Json,
        _ => ExportFormat::Csv,
    }
}

/// Resolve `-o` for a server export: a directory receives the server's file
/// name, anything else is used as the file path.
fn export_target(output: Option<&Path>, filename: &str) -> anyhow::Result<PathBuf> {
    let name = Path::new(filename)
        .file_name()
        .with_context(|| format!("invalid export file name '{filename}'"))?;
    Ok(match output {
        Some(path) if path.is_dir() => path.join(name),
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir()?.join(name),
    })
}
