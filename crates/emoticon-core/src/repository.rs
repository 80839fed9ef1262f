//! Record and name-index persistence.
//!
//! [`RecordRepository`] is the query surface the group logic runs on. It holds no
//! business rules beyond "one active record per name", which `insert` enforces
//! atomically. [`JsonRepository`] keeps everything in memory and mirrors each
//! collection to a pretty-printed JSON file after every mutation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::types::{EmoticonRecord, NameIndexEntry};

const RECORDS_FILENAME: &str = "records.json";
const NAMES_FILENAME: &str = "names.json";

#[async_trait]
pub trait RecordRepository: Send + Sync {
    async fn find_active(&self, name: &str) -> Result<Option<EmoticonRecord>, RepositoryError>;

    /// Active records whose name is in `names`.
    async fn find_active_by_names(
        &self,
        names: &[String],
    ) -> Result<Vec<EmoticonRecord>, RepositoryError>;

    /// Active records whose `equivalents` share at least one entry with `names`.
    async fn find_active_referencing(
        &self,
        names: &[String],
    ) -> Result<Vec<EmoticonRecord>, RepositoryError>;

    async fn find_active_in_group(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<EmoticonRecord>, RepositoryError>;

    async fn list_active(&self) -> Result<Vec<EmoticonRecord>, RepositoryError>;

    /// Store a new record. Fails with `NameTaken` if an active record has its name.
    async fn insert(&self, record: &EmoticonRecord) -> Result<(), RepositoryError>;

    /// Replace the stored record with the same id.
    async fn save(&self, record: &EmoticonRecord) -> Result<(), RepositoryError>;

    async fn insert_name(&self, entry: &NameIndexEntry) -> Result<(), RepositoryError>;

    /// Remove every index entry for `name`.
    async fn remove_name(&self, name: &str) -> Result<(), RepositoryError>;

    async fn list_names(&self) -> Result<Vec<NameIndexEntry>, RepositoryError>;
}

#[derive(Default)]
struct State {
    records: Vec<EmoticonRecord>,
    names: Vec<NameIndexEntry>,
}

/// JSON-file repository. `dir == None` keeps everything in memory only.
pub struct JsonRepository {
    dir: Option<PathBuf>,
    state: RwLock<State>,
}

impl JsonRepository {
    /// Open (or start) a repository rooted at `dir`, loading any existing files.
    pub async fn open(dir: &Path) -> Result<Self, RepositoryError> {
        tokio::fs::create_dir_all(dir).await?;
        let records: Vec<EmoticonRecord> = load_json(&dir.join(RECORDS_FILENAME)).await?;
        let names: Vec<NameIndexEntry> = load_json(&dir.join(NAMES_FILENAME)).await?;
        info!(
            "Loaded {} records and {} name entries from {}",
            records.len(),
            names.len(),
            dir.display()
        );
        Ok(Self {
            dir: Some(dir.to_path_buf()),
            state: RwLock::new(State { records, names }),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            dir: None,
            state: RwLock::new(State::default()),
        }
    }

    /// Every record, removed ones included.
    pub async fn all_records(&self) -> Vec<EmoticonRecord> {
        self.state.read().await.records.clone()
    }

    // Callers stage changes on a copy and swap it in only once this succeeds.
    async fn persist_records(&self, records: &[EmoticonRecord]) -> Result<(), RepositoryError> {
        if let Some(dir) = &self.dir {
            write_json(&dir.join(RECORDS_FILENAME), records).await?;
        }
        Ok(())
    }

    async fn persist_names(&self, names: &[NameIndexEntry]) -> Result<(), RepositoryError> {
        if let Some(dir) = &self.dir {
            write_json(&dir.join(NAMES_FILENAME), names).await?;
        }
        Ok(())
    }

    async fn select(
        &self,
        pred: impl Fn(&EmoticonRecord) -> bool,
    ) -> Vec<EmoticonRecord> {
        self.state
            .read()
            .await
            .records
            .iter()
            .filter(|r| r.is_active() && pred(r))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RecordRepository for JsonRepository {
    async fn find_active(&self, name: &str) -> Result<Option<EmoticonRecord>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .records
            .iter()
            .find(|r| r.is_active() && r.name == name)
            .cloned())
    }

    async fn find_active_by_names(
        &self,
        names: &[String],
    ) -> Result<Vec<EmoticonRecord>, RepositoryError> {
        Ok(self.select(|r| names.contains(&r.name)).await)
    }

    async fn find_active_referencing(
        &self,
        names: &[String],
    ) -> Result<Vec<EmoticonRecord>, RepositoryError> {
        Ok(self
            .select(|r| r.equivalents.iter().any(|e| names.contains(e)))
            .await)
    }

    async fn find_active_in_group(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<EmoticonRecord>, RepositoryError> {
        Ok(self.select(|r| r.group_id == group_id).await)
    }

    async fn list_active(&self) -> Result<Vec<EmoticonRecord>, RepositoryError> {
        Ok(self.select(|_| true).await)
    }

    async fn insert(&self, record: &EmoticonRecord) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if record.is_active()
            && state
                .records
                .iter()
                .any(|r| r.is_active() && r.name == record.name)
        {
            return Err(RepositoryError::NameTaken(record.name.clone()));
        }
        let mut records = state.records.clone();
        records.push(record.clone());
        self.persist_records(&records).await?;
        state.records = records;
        Ok(())
    }

    async fn save(&self, record: &EmoticonRecord) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let mut records = state.records.clone();
        let slot = records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or(RepositoryError::UnknownRecord(record.id))?;
        *slot = record.clone();
        self.persist_records(&records).await?;
        state.records = records;
        Ok(())
    }

    async fn insert_name(&self, entry: &NameIndexEntry) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let mut names = state.names.clone();
        names.push(entry.clone());
        self.persist_names(&names).await?;
        state.names = names;
        Ok(())
    }

    async fn remove_name(&self, name: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let mut names = state.names.clone();
        names.retain(|n| n.name != name);
        self.persist_names(&names).await?;
        state.names = names;
        Ok(())
    }

    async fn list_names(&self) -> Result<Vec<NameIndexEntry>, RepositoryError> {
        Ok(self.state.read().await.names.clone())
    }
}

async fn load_json<T: serde::de::DeserializeOwned + Default>(
    path: &Path,
) -> Result<T, RepositoryError> {
    if !path.is_file() {
        return Ok(T::default());
    }
    let content = tokio::fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&content).map_err(|e| {
        error!("Failed to parse {}: {}", path.display(), e);
        RepositoryError::from(e)
    })
}

// Write to a sibling temp file, then rename over the target.
async fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), RepositoryError> {
    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> EmoticonRecord {
        EmoticonRecord::new(name, PathBuf::from(format!("{}.png", name)))
    }

    #[tokio::test]
    async fn test_insert_rejects_active_duplicate_name() {
        let repo = JsonRepository::in_memory();
        repo.insert(&record("smile")).await.unwrap();
        let err = repo.insert(&record("smile")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NameTaken(n) if n == "smile"));
    }

    #[tokio::test]
    async fn test_removed_name_can_be_reused() {
        let repo = JsonRepository::in_memory();
        let mut first = record("smile");
        repo.insert(&first).await.unwrap();
        first.removed = true;
        repo.save(&first).await.unwrap();

        assert!(repo.find_active("smile").await.unwrap().is_none());
        repo.insert(&record("smile")).await.unwrap();
        assert!(repo.find_active("smile").await.unwrap().is_some());
        assert_eq!(repo.all_records().await.len(), 2);
    }

    #[tokio::test]
    async fn test_save_unknown_record_fails() {
        let repo = JsonRepository::in_memory();
        assert!(matches!(
            repo.save(&record("ghost")).await,
            Err(RepositoryError::UnknownRecord(_))
        ));
    }

    #[tokio::test]
    async fn test_membership_queries() {
        let repo = JsonRepository::in_memory();
        let mut a = record("a");
        a.equivalents = vec!["b".into()];
        let mut b = record("b");
        b.equivalents = vec!["a".into()];
        b.group_id = a.group_id;
        let c = record("c");
        for r in [&a, &b, &c] {
            repo.insert(r).await.unwrap();
        }

        let by_names = repo
            .find_active_by_names(&["a".into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(by_names.len(), 2);

        let referencing = repo.find_active_referencing(&["a".into()]).await.unwrap();
        assert_eq!(referencing.len(), 1);
        assert_eq!(referencing[0].name, "b");

        let group = repo.find_active_in_group(a.group_id).await.unwrap();
        assert_eq!(group.len(), 2);
    }

    #[tokio::test]
    async fn test_reopen_restores_state() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let repo = JsonRepository::open(tmp.path()).await.unwrap();
            repo.insert(&record("wave")).await.unwrap();
            repo.insert_name(&NameIndexEntry { name: "wave".into() })
                .await
                .unwrap();
        }
        let repo = JsonRepository::open(tmp.path()).await.unwrap();
        assert!(repo.find_active("wave").await.unwrap().is_some());
        assert_eq!(repo.list_names().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_name_drops_all_entries() {
        let repo = JsonRepository::in_memory();
        for _ in 0..2 {
            repo.insert_name(&NameIndexEntry { name: "dup".into() })
                .await
                .unwrap();
        }
        repo.insert_name(&NameIndexEntry { name: "keep".into() })
            .await
            .unwrap();
        repo.remove_name("dup").await.unwrap();
        let names = repo.list_names().await.unwrap();
        assert_eq!(names, vec![NameIndexEntry { name: "keep".into() }]);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = JsonRepository::open(tmp.path()).await.unwrap();
        let mut kept = record("kept");
        repo.insert(&kept).await.unwrap();

        // A directory where the temp file should go makes every write fail.
        std::fs::create_dir(tmp.path().join("records.json.tmp")).unwrap();
        std::fs::create_dir(tmp.path().join("names.json.tmp")).unwrap();

        assert!(repo.insert(&record("smile")).await.is_err());
        assert!(repo.find_active("smile").await.unwrap().is_none());

        kept.removed = true;
        assert!(repo.save(&kept).await.is_err());
        assert!(repo.find_active("kept").await.unwrap().is_some());

        assert!(repo
            .insert_name(&NameIndexEntry { name: "smile".into() })
            .await
            .is_err());
        assert!(repo.list_names().await.unwrap().is_empty());
    }
}
