//! Equivalence-group maintenance on top of a [`RecordRepository`].
//!
//! Every record keeps its own copy of its synonym list; the coordinator keeps
//! those copies in step when a member is added, repointed or removed. Each
//! operation holds its group's lock from re-validation to the end of fan-out and
//! records its intent in the [`Journal`] first.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::error::{GroupError, RepositoryError};
use crate::journal::{GroupOp, Intent, Journal};
use crate::locks::{GroupGuard, GroupLocks};
use crate::repository::RecordRepository;
use crate::types::{EmoticonRecord, NameIndexEntry};

/// Per-member results of a fan-out. Successful writes are never rolled back.
#[derive(Debug, Default)]
pub struct FanOut {
    pub updated: Vec<EmoticonRecord>,
    pub failures: Vec<(String, RepositoryError)>,
}

impl FanOut {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A newly inserted record plus the writes that followed it. The record stays even
/// when some of those writes failed.
#[derive(Debug)]
pub struct Created {
    pub created: EmoticonRecord,
    pub fan_out: FanOut,
}

#[derive(Debug)]
pub struct Removed {
    pub removed: EmoticonRecord,
    pub fan_out: FanOut,
}

pub struct EquivalenceCoordinator {
    repo: Arc<dyn RecordRepository>,
    journal: Arc<Journal>,
    locks: GroupLocks,
}

impl EquivalenceCoordinator {
    pub fn new(repo: Arc<dyn RecordRepository>, journal: Arc<Journal>) -> Self {
        Self {
            repo,
            journal,
            locks: GroupLocks::new(),
        }
    }

    /// New record in a fresh group, plus its name-index entry.
    pub async fn create(
        &self,
        name: &str,
        content_path: PathBuf,
    ) -> Result<Created, GroupError> {
        let created = EmoticonRecord::new(name, content_path);
        self.repo.insert(&created).await.map_err(name_taken)?;

        let mut fan_out = FanOut::default();
        if let Err(e) = self
            .repo
            .insert_name(&NameIndexEntry {
                name: name.to_string(),
            })
            .await
        {
            error!("Created '{}' but could not index it: {}", name, e);
            fan_out.failures.push((name.to_string(), e));
        }
        info!("Created '{}' in group {}", name, created.group_id);
        Ok(Created { created, fan_out })
    }

    /// Add `name` as a synonym of `target`, sharing its content, and link it into
    /// every active member of target's group.
    pub async fn duplicate(&self, name: &str, target: &str) -> Result<Created, GroupError> {
        let (guard, target) = self.lock_active(target).await?;
        if self.repo.find_active(name).await?.is_some() {
            return Err(GroupError::NameTaken(name.to_string()));
        }

        let members = self.group_members(&target).await?;
        let mut created = EmoticonRecord::new(name, target.content_path.clone());
        created.group_id = target.group_id;
        created.add_equivalent(&target.name);
        for m in &members {
            created.add_equivalent(&m.name);
        }

        let intent = self
            .begin(GroupOp::Duplicate, &guard, name, &members)
            .await?;
        if let Err(e) = self.repo.insert(&created).await {
            // Nothing was applied.
            self.commit(&intent).await;
            return Err(name_taken(e));
        }

        let mut fan_out = self
            .fan_out(members, |m| {
                let changed = m.add_equivalent(name);
                if changed {
                    m.touch();
                }
                changed
            })
            .await;

        if let Err(e) = self
            .repo
            .insert_name(&NameIndexEntry {
                name: name.to_string(),
            })
            .await
        {
            fan_out.failures.push((name.to_string(), e));
        }

        self.finish(&intent, &fan_out).await;
        info!(
            "Duplicated '{}' -> '{}' ({} members linked)",
            name,
            target.name,
            fan_out.updated.len()
        );
        Ok(Created { created, fan_out })
    }

    /// Point every active member of `name`'s group at `content_path`.
    pub async fn repoint(&self, name: &str, content_path: PathBuf) -> Result<FanOut, GroupError> {
        let (guard, prev) = self.lock_active(name).await?;
        let members = self.group_members(&prev).await?;
        let intent = self.begin(GroupOp::Update, &guard, name, &members).await?;

        let fan_out = self
            .fan_out(members, |m| {
                m.content_path = content_path.clone();
                m.touch();
                true
            })
            .await;

        self.finish(&intent, &fan_out).await;
        info!(
            "Repointed group of '{}' ({} members) to {}",
            name,
            fan_out.updated.len(),
            content_path.display()
        );
        Ok(fan_out)
    }

    /// Soft-delete `name` and drop it from every active record that lists it.
    pub async fn remove(&self, name: &str) -> Result<Removed, GroupError> {
        let (guard, mut prev) = self.lock_active(name).await?;

        let referencing: Vec<EmoticonRecord> = self
            .repo
            .find_active_referencing(&prev.group_names())
            .await?
            .into_iter()
            .filter(|r| r.id != prev.id && r.equivalents.iter().any(|e| e == name))
            .collect();

        let intent = self
            .begin(GroupOp::Delete, &guard, name, &referencing)
            .await?;

        prev.removed = true;
        prev.touch();
        if let Err(e) = self.repo.save(&prev).await {
            self.commit(&intent).await;
            return Err(e.into());
        }

        let mut fan_out = self
            .fan_out(referencing, |m| {
                let changed = m.remove_equivalent(name);
                if changed {
                    m.touch();
                }
                changed
            })
            .await;

        if let Err(e) = self.repo.remove_name(name).await {
            fan_out.failures.push((name.to_string(), e));
        }

        self.finish(&intent, &fan_out).await;
        info!(
            "Removed '{}' ({} references repaired)",
            name,
            fan_out.updated.len()
        );
        Ok(Removed {
            removed: prev,
            fan_out,
        })
    }

    /// Active members of `name`'s group, `name` included.
    pub async fn members(&self, name: &str) -> Result<Vec<EmoticonRecord>, GroupError> {
        let record = self
            .repo
            .find_active(name)
            .await?
            .ok_or_else(|| GroupError::NotFound(name.to_string()))?;
        self.group_members(&record).await
    }

    // ── Internals ──

    /// Lock the group `name` currently belongs to and return its fresh record.
    async fn lock_active(&self, name: &str) -> Result<(GroupGuard, EmoticonRecord), GroupError> {
        loop {
            let seen = self
                .repo
                .find_active(name)
                .await?
                .ok_or_else(|| GroupError::NotFound(name.to_string()))?;
            let guard = self.locks.lock(seen.group_id).await;
            match self.repo.find_active(name).await? {
                Some(current) if current.group_id == guard.group_id => return Ok((guard, current)),
                // Deleted and re-created into another group while we waited.
                Some(_) => continue,
                None => return Err(GroupError::NotFound(name.to_string())),
            }
        }
    }

    /// Union of the record's synonym list (plus itself) and its group-id peers.
    async fn group_members(
        &self,
        record: &EmoticonRecord,
    ) -> Result<Vec<EmoticonRecord>, GroupError> {
        let mut members = self
            .repo
            .find_active_by_names(&record.group_names())
            .await?;
        for peer in self.repo.find_active_in_group(record.group_id).await? {
            if !members.iter().any(|m| m.id == peer.id) {
                members.push(peer);
            }
        }
        Ok(members)
    }

    /// Apply `mutate` to each member and save the changed ones concurrently.
    async fn fan_out<F>(&self, members: Vec<EmoticonRecord>, mutate: F) -> FanOut
    where
        F: Fn(&mut EmoticonRecord) -> bool,
    {
        let repo = &self.repo;
        let writes = members.into_iter().filter_map(|mut m| {
            if !mutate(&mut m) {
                return None;
            }
            Some(async move {
                match repo.save(&m).await {
                    Ok(()) => Ok(m),
                    Err(e) => Err((m.name, e)),
                }
            })
        });

        let mut out = FanOut::default();
        for result in join_all(writes).await {
            match result {
                Ok(m) => out.updated.push(m),
                Err((name, e)) => {
                    error!("Fan-out write to '{}' failed: {}", name, e);
                    out.failures.push((name, e));
                }
            }
        }
        out
    }

    async fn begin(
        &self,
        op: GroupOp,
        guard: &GroupGuard,
        name: &str,
        members: &[EmoticonRecord],
    ) -> Result<Intent, GroupError> {
        let names = members.iter().map(|m| m.name.clone()).collect();
        Ok(self.journal.begin(op, guard.group_id, name, names).await?)
    }

    async fn commit(&self, intent: &Intent) {
        if let Err(e) = self.journal.commit(intent).await {
            error!("Failed to commit journal intent {}: {}", intent.id, e);
        }
    }

    /// Commit only when every write landed; otherwise leave the intent pending.
    async fn finish(&self, intent: &Intent, fan_out: &FanOut) {
        if fan_out.is_complete() {
            self.commit(intent).await;
        } else {
            warn!(
                "{:?} on '{}' left {} member(s) unwritten; intent {} stays pending",
                intent.op,
                intent.name,
                fan_out.failures.len(),
                intent.id
            );
        }
    }
}

fn name_taken(e: RepositoryError) -> GroupError {
    match e {
        RepositoryError::NameTaken(name) => GroupError::NameTaken(name),
        other => GroupError::Repository(other),
    }
}
