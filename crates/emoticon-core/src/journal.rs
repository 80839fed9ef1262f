//! Intent journal for group fan-outs.
//!
//! A `begin` line is appended before member writes start and a `commit` line once
//! every write landed. A `begin` without its `commit` marks a group that may be
//! inconsistent (crash or partial failure mid fan-out).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::JournalError;

const JOURNAL_FILENAME: &str = "journal.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOp {
    Duplicate,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub id: Uuid,
    pub op: GroupOp,
    pub group_id: Uuid,
    /// The name the operation was invoked on
    pub name: String,
    pub members: Vec<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
enum JournalLine {
    Begin(Intent),
    Commit { id: Uuid },
}

pub struct Journal {
    path: Option<PathBuf>,
    lines: Mutex<Vec<JournalLine>>,
}

impl Journal {
    pub fn open(dir: &Path) -> Self {
        let path = dir.join(JOURNAL_FILENAME);
        let lines = load(&path);
        Self {
            path: Some(path),
            lines: Mutex::new(lines),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            lines: Mutex::new(Vec::new()),
        }
    }

    pub async fn begin(
        &self,
        op: GroupOp,
        group_id: Uuid,
        name: &str,
        members: Vec<String>,
    ) -> Result<Intent, JournalError> {
        let intent = Intent {
            id: Uuid::new_v4(),
            op,
            group_id,
            name: name.to_string(),
            members,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        self.append(JournalLine::Begin(intent.clone())).await?;
        debug!("Journal begin {:?} {} ({})", op, name, intent.id);
        Ok(intent)
    }

    pub async fn commit(&self, intent: &Intent) -> Result<(), JournalError> {
        self.append(JournalLine::Commit { id: intent.id }).await?;
        debug!("Journal commit {}", intent.id);
        Ok(())
    }

    /// Begun intents that never committed, oldest first.
    pub async fn pending(&self) -> Vec<Intent> {
        let lines = self.lines.lock().await;
        let committed: HashSet<Uuid> = lines
            .iter()
            .filter_map(|l| match l {
                JournalLine::Commit { id } => Some(*id),
                JournalLine::Begin(_) => None,
            })
            .collect();
        lines
            .iter()
            .filter_map(|l| match l {
                JournalLine::Begin(intent) if !committed.contains(&intent.id) => {
                    Some(intent.clone())
                }
                _ => None,
            })
            .collect()
    }

    async fn append(&self, line: JournalLine) -> Result<(), JournalError> {
        let mut lines = self.lines.lock().await;
        if let Some(path) = &self.path {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            let mut text = serde_json::to_string(&line)?;
            text.push('\n');
            file.write_all(text.as_bytes()).await?;
            file.flush().await?;
        }
        lines.push(line);
        Ok(())
    }
}

fn load(path: &Path) -> Vec<JournalLine> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| match serde_json::from_str(l) {
            Ok(line) => Some(line),
            Err(e) => {
                error!("Failed to parse journal line: {}", e);
                None
            }
        })
        .collect()
}
