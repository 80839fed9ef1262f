//! Append-only audit trail of every mutation and read.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info};
use uuid::Uuid;

use crate::types::{ActorContext, AuditEntry, AuditKind, EmoticonRecord};

const AUDIT_FILENAME: &str = "audit.jsonl";

/// JSONL audit log. Entries are also kept in memory and broadcast to subscribers.
pub struct AuditLog {
    path: Option<PathBuf>,
    entries: Mutex<Vec<AuditEntry>>,
    history_tx: broadcast::Sender<AuditEntry>,
}

impl AuditLog {
    /// Open the log in `dir`, loading existing entries from disk.
    pub fn open(dir: &Path) -> Self {
        let path = dir.join(AUDIT_FILENAME);
        let entries = load(&path);
        let (history_tx, _) = broadcast::channel(256);
        Self {
            path: Some(path),
            entries: Mutex::new(entries),
            history_tx,
        }
    }

    pub fn in_memory() -> Self {
        let (history_tx, _) = broadcast::channel(256);
        Self {
            path: None,
            entries: Mutex::new(Vec::new()),
            history_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditEntry> {
        self.history_tx.subscribe()
    }

    /// Append one entry for `subject`. Memory and subscribers only see entries
    /// that reached the file.
    pub async fn record(
        &self,
        kind: AuditKind,
        context: &ActorContext,
        subject: &EmoticonRecord,
    ) -> std::io::Result<AuditEntry> {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            kind,
            timestamp: chrono::Utc::now().to_rfc3339(),
            context: context.render(),
            subject: subject.clone(),
        };

        let mut entries = self.entries.lock().await;
        if let Err(e) = self.append_to_file(&entry).await {
            error!("Failed to write audit entry for '{}': {}", subject.name, e);
            return Err(e);
        }
        entries.push(entry.clone());
        drop(entries);

        info!("[{}] {} by {}", kind, subject.name, context);
        let _ = self.history_tx.send(entry.clone());
        Ok(entry)
    }

    async fn append_to_file(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn entries_for(&self, name: &str) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.subject.name == name)
            .cloned()
            .collect()
    }
}

fn load(path: &Path) -> Vec<AuditEntry> {
    if !path.is_file() {
        return Vec::new();
    }
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let mut entries = Vec::new();
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<AuditEntry>(line) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => error!("Failed to parse audit line: {}", e),
                }
            }
            info!("Loaded {} audit entries", entries.len());
            entries
        }
        Err(e) => {
            error!("Failed to load audit log: {}", e);
            Vec::new()
        }
    }
}
