//! Test doubles shared across module tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{RepositoryError, TransportError};
use crate::repository::{JsonRepository, RecordRepository};
use crate::transport::Transport;
use crate::types::{EmoticonRecord, NameIndexEntry};

/// Serves fixed bodies per URL; anything else is a 404.
#[derive(Default)]
pub struct StubTransport {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(self, url: &str, body: &[u8]) -> Self {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_vec());
        self
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Wraps a real repository and fails `save` or `insert_name` for chosen names.
pub struct FlakyRepository {
    inner: Arc<JsonRepository>,
    failing: Mutex<HashSet<String>>,
    unindexable: Mutex<HashSet<String>>,
}

impl FlakyRepository {
    pub fn new(inner: Arc<JsonRepository>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
            unindexable: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_saves_for(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_index_for(&self, name: &str) {
        self.unindexable.lock().unwrap().insert(name.to_string());
    }

    fn should_fail(&self, name: &str) -> bool {
        self.failing.lock().unwrap().contains(name)
    }
}

fn injected(op: &str, name: &str) -> RepositoryError {
    RepositoryError::Io(std::io::Error::other(format!(
        "injected {} failure for '{}'",
        op, name
    )))
}

#[async_trait]
impl RecordRepository for FlakyRepository {
    async fn find_active(&self, name: &str) -> Result<Option<EmoticonRecord>, RepositoryError> {
        self.inner.find_active(name).await
    }

    async fn find_active_by_names(
        &self,
        names: &[String],
    ) -> Result<Vec<EmoticonRecord>, RepositoryError> {
        self.inner.find_active_by_names(names).await
    }

    async fn find_active_referencing(
        &self,
        names: &[String],
    ) -> Result<Vec<EmoticonRecord>, RepositoryError> {
        self.inner.find_active_referencing(names).await
    }

    async fn find_active_in_group(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<EmoticonRecord>, RepositoryError> {
        self.inner.find_active_in_group(group_id).await
    }

    async fn list_active(&self) -> Result<Vec<EmoticonRecord>, RepositoryError> {
        self.inner.list_active().await
    }

    async fn insert(&self, record: &EmoticonRecord) -> Result<(), RepositoryError> {
        self.inner.insert(record).await
    }

    async fn save(&self, record: &EmoticonRecord) -> Result<(), RepositoryError> {
        if self.should_fail(&record.name) {
            return Err(injected("save", &record.name));
        }
        self.inner.save(record).await
    }

    async fn insert_name(&self, entry: &NameIndexEntry) -> Result<(), RepositoryError> {
        if self.unindexable.lock().unwrap().contains(&entry.name) {
            return Err(injected("index", &entry.name));
        }
        self.inner.insert_name(entry).await
    }

    async fn remove_name(&self, name: &str) -> Result<(), RepositoryError> {
        self.inner.remove_name(name).await
    }

    async fn list_names(&self) -> Result<Vec<NameIndexEntry>, RepositoryError> {
        self.inner.list_names().await
    }
}
