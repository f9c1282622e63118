use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tokio::sync::mpsc;

use bizenrich_core::model::ResultRecord;
use bizenrich_core::session;
use bizenrich_core::{ApiClient, Config, ConnectionStatus, ResumeTicket, StreamClient};
use bizenrich_reporting::{ExportFormat, export_filename, write_export};

use crate::app::Command;
use crate::tui_event::BackendEvent;

/// Runs the app's commands against the backend and reports back through
/// the event channel. Every request is spawned; nothing here blocks the UI.
pub struct Backend {
    api: Arc<ApiClient>,
    stream: StreamClient<ApiClient>,
    tx: mpsc::UnboundedSender<BackendEvent>,
    export_dir: PathBuf,
}

impl Backend {
    pub fn new(
        api: ApiClient,
        config: &Config,
        tx: mpsc::UnboundedSender<BackendEvent>,
        export_dir: PathBuf,
    ) -> Self {
        let api = Arc::new(api);
        let stream = StreamClient::new(api.clone(), config);
        Self {
            api,
            stream,
            tx,
            export_dir,
        }
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.stream.status()
    }

    pub fn execute(&self, command: Command) {
        match command {
            Command::Upload(path) => {
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = api.upload_csv(&path).await;
                    let _ = tx.send(BackendEvent::Uploaded(result));
                });
            }
            Command::Attach(batch_id) => {
                let tx = self.tx.clone();
                self.stream.connect(
                    Some(&batch_id),
                    Arc::new(move |event| {
                        let _ = tx.send(BackendEvent::Stream(event));
                    }),
                );
            }
            Command::Detach => self.stream.disconnect(),
            Command::FetchFinal(batch_id) => {
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = api.batch_status(&batch_id).await;
                    let _ = tx.send(BackendEvent::FinalResults { batch_id, result });
                });
            }
            Command::ExportServer(batch_id) => {
                let api = self.api.clone();
                let tx = self.tx.clone();
                let dir = self.export_dir.clone();
                tokio::spawn(async move {
                    let result = match api.export_csv(&batch_id).await {
                        Ok((filename, bytes)) => save_download(&dir, &filename, bytes).await,
                        Err(e) => Err(e.to_string()),
                    };
                    let _ = tx.send(BackendEvent::Exported(result));
                });
            }
            Command::ExportLocal { format, records } => {
                let tx = self.tx.clone();
                let dir = self.export_dir.clone();
                tokio::spawn(async move {
                    let result = tokio::task::spawn_blocking(move || {
                        export_local(&dir, format, &records)
                    })
                    .await
                    .unwrap_or_else(|e| Err(format!("Task join error: {e}")));
                    let _ = tx.send(BackendEvent::Exported(result));
                });
            }
            Command::CheckHealth => {
                let api = self.api.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let report = api.health().await;
                    let _ = tx.send(BackendEvent::Health(report));
                });
            }
        }
    }

    /// Look the persisted batch up again and report what to do with it.
    pub fn resume(&self, ticket: ResumeTicket) {
        let api = self.api.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            log::debug!("checking persisted batch {}", ticket.batch_id);
            let outcome = session::resume(api.as_ref(), &ticket).await;
            let _ = tx.send(BackendEvent::Resumed(outcome));
        });
    }

    pub fn shutdown(&self) {
        self.stream.disconnect();
    }
}

async fn save_download(dir: &Path, filename: &str, bytes: Vec<u8>) -> Result<PathBuf, String> {
    // The name comes from a response header; keep only its last component.
    let name = Path::new(filename)
        .file_name()
        .map(|n| n.to_owned())
        .ok_or_else(|| format!("invalid export file name '{filename}'"))?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| format!("{}: {e}", dir.display()))?;
    let path = dir.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| format!("{}: {e}", path.display()))?;
    log::info!("saved server export to {}", path.display());
    Ok(path)
}

fn export_local(
    dir: &Path,
    format: ExportFormat,
    records: &[ResultRecord],
) -> Result<PathBuf, String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("{}: {e}", dir.display()))?;
    let path = dir.join(export_filename(format, Local::now()));
    write_export(&path, format, records).map_err(|e| e.to_string())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizenrich_core::model::OriginalData;

    #[test]
    fn local_export_creates_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("exports");
        let records = vec![ResultRecord {
            job_id: Some("j1".into()),
            original_data: OriginalData {
                name: "Cafe Roma".into(),
                ..Default::default()
            },
            scraped_data: None,
            processing_time: None,
            processed_at: None,
            worker: None,
            error: Some("Timeout".into()),
        }];

        let path = export_local(&target, ExportFormat::Csv, &records).unwrap();
        assert!(path.starts_with(&target));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("csv"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Cafe Roma"));
    }

    #[tokio::test]
    async fn download_name_is_confined_to_export_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_download(dir.path(), "../../etc/evil.csv", b"a,b\n".to_vec())
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("evil.csv"));
        assert_eq!(std::fs::read(&path).unwrap(), b"a,b\n");
    }
}
