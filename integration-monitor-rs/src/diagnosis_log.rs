// integration-monitor-rs/src/diagnosis_log.rs
// Append-only NDJSON record of non-healthy cycle entries.

use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::monitor::CycleEntry;
use crate::MonitorError;

/// One `CycleEntry` per line.
#[derive(Debug)]
pub struct DiagnosisLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl DiagnosisLog {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, MonitorError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            // One-time startup check, blocking is fine here.
            std::fs::create_dir_all(parent)?;
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &CycleEntry) -> Result<(), MonitorError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    pub async fn read_all(&self) -> Result<Vec<CycleEntry>, MonitorError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let buf = fs::read_to_string(&self.path).await?;
        let mut out = Vec::new();
        for line in buf.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CycleEntry>(line) {
                Ok(entry) => out.push(entry),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to parse diagnosis log line; skipping");
                }
            }
        }

        Ok(out)
    }
}
