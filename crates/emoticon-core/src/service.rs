//! EmoticonService — the public face of the catalogue.
//!
//! Checks preconditions, pulls content through the [`ContentStore`], hands group
//! changes to the [`EquivalenceCoordinator`] and writes one audit entry per
//! touched record. Infrastructure failures are reported on the [`ErrorReporter`]
//! and come back as [`Outcome::InternalError`]; nothing here returns `Err`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use futures::future::join_all;
use tracing::{info, warn};

use crate::audit::AuditLog;
use crate::config::Config;
use crate::content::ContentStore;
use crate::equivalence::{EquivalenceCoordinator, FanOut};
use crate::error::{ContentError, GroupError};
use crate::events::ErrorReporter;
use crate::journal::Journal;
use crate::repository::{JsonRepository, RecordRepository};
use crate::transport::{HttpTransport, Transport};
use crate::types::{ActorContext, AuditEntry, AuditKind, EmoticonRecord, Outcome};

pub struct EmoticonService {
    config: Config,
    repo: Arc<dyn RecordRepository>,
    content: ContentStore,
    coordinator: EquivalenceCoordinator,
    audit: Arc<AuditLog>,
    journal: Arc<Journal>,
    errors: ErrorReporter,
}

impl EmoticonService {
    /// Production wiring: JSON files under `data_dir`, blobs under `content_dir`, HTTP downloads.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let data_dir = config.data_path();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

        let repo = Arc::new(
            JsonRepository::open(&data_dir)
                .await
                .context("Failed to open record store")?,
        );
        let audit = Arc::new(AuditLog::open(&data_dir));
        let journal = Arc::new(Journal::open(&data_dir));
        let transport = Arc::new(HttpTransport::new(&config)?);

        let service = Self::assemble(config, transport, repo, audit, journal)
            .await
            .context("Failed to initialize content store")?;
        Ok(service)
    }

    /// Wire explicit collaborators. Initializes the content directory and
    /// reports any fan-out left unfinished by a previous run.
    pub async fn assemble(
        config: Config,
        transport: Arc<dyn Transport>,
        repo: Arc<dyn RecordRepository>,
        audit: Arc<AuditLog>,
        journal: Arc<Journal>,
    ) -> Result<Self, ContentError> {
        let content = ContentStore::new(&config, transport);
        content.initialize().await?;

        let service = Self {
            coordinator: EquivalenceCoordinator::new(Arc::clone(&repo), Arc::clone(&journal)),
            config,
            repo,
            content,
            audit,
            journal,
            errors: ErrorReporter::new(),
        };
        service.report_pending().await;
        Ok(service)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn errors(&self) -> &ErrorReporter {
        &self.errors
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Re-publish every unfinished group intent.
    pub async fn report_pending(&self) -> usize {
        let pending = self.journal.pending().await;
        for intent in &pending {
            warn!(
                "Unfinished {:?} on '{}' (group {}, members {:?})",
                intent.op, intent.name, intent.group_id, intent.members
            );
            self.errors.report_raw(
                format!(
                    "unfinished {:?} on '{}' may have left group {} inconsistent",
                    intent.op, intent.name, intent.group_id
                ),
                format!("journal intent {} at {}", intent.id, intent.timestamp),
            );
        }
        pending.len()
    }

    // ── Mutations ──

    pub async fn upload(
        &self,
        ctx: &ActorContext,
        name: &str,
        url: &str,
    ) -> Outcome<EmoticonRecord> {
        match self.repo.find_active(name).await {
            Ok(Some(_)) => return Outcome::Conflict,
            Ok(None) => {}
            Err(e) => return self.internal(&e, ctx),
        }

        let path = match self.content.fetch_and_store(url).await {
            Ok(p) => p,
            Err(e) => return self.internal(&e, ctx),
        };

        let created = match self.coordinator.create(name, path).await {
            Ok(c) => c,
            Err(e) => return self.group_failure(e, ctx),
        };

        self.log(AuditKind::Create, ctx, &created.created).await;
        self.settle(created.fan_out, ctx, created.created)
    }

    /// `name` becomes a synonym of `target`, sharing its content.
    pub async fn duplicate(
        &self,
        ctx: &ActorContext,
        name: &str,
        target: &str,
    ) -> Outcome<EmoticonRecord> {
        match self.repo.find_active(target).await {
            Ok(Some(_)) => {}
            Ok(None) => return Outcome::NotFound,
            Err(e) => return self.internal(&e, ctx),
        }
        match self.repo.find_active(name).await {
            Ok(Some(_)) => return Outcome::Conflict,
            Ok(None) => {}
            Err(e) => return self.internal(&e, ctx),
        }

        let dup = match self.coordinator.duplicate(name, target).await {
            Ok(d) => d,
            Err(e) => return self.group_failure(e, ctx),
        };

        self.log_all(AuditKind::Update, ctx, &dup.fan_out.updated).await;
        self.log(AuditKind::Create, ctx, &dup.created).await;
        self.settle(dup.fan_out, ctx, dup.created)
    }

    /// Download new content and repoint the whole group at it.
    pub async fn update(
        &self,
        ctx: &ActorContext,
        name: &str,
        url: &str,
    ) -> Outcome<Vec<EmoticonRecord>> {
        match self.repo.find_active(name).await {
            Ok(Some(_)) => {}
            Ok(None) => return Outcome::NotFound,
            Err(e) => return self.internal(&e, ctx),
        }

        let path = match self.content.fetch_and_store(url).await {
            Ok(p) => p,
            Err(e) => return self.internal(&e, ctx),
        };

        let fan_out = match self.coordinator.repoint(name, path).await {
            Ok(f) => f,
            Err(e) => return self.group_failure(e, ctx),
        };

        self.log_all(AuditKind::Update, ctx, &fan_out.updated).await;
        let updated = fan_out.updated.clone();
        self.settle(fan_out, ctx, updated)
    }

    /// Soft-delete `name` and unlink it from its synonyms.
    pub async fn delete(&self, ctx: &ActorContext, name: &str) -> Outcome<EmoticonRecord> {
        let removed = match self.coordinator.remove(name).await {
            Ok(r) => r,
            Err(e) => return self.group_failure(e, ctx),
        };

        self.log_all(AuditKind::Update, ctx, &removed.fan_out.updated)
            .await;
        self.log(AuditKind::Delete, ctx, &removed.removed).await;
        self.settle(removed.fan_out, ctx, removed.removed)
    }

    // ── Reads ──

    /// Stored content path for an active name. Only hits are audited.
    pub async fn fetch(&self, ctx: &ActorContext, name: &str) -> Outcome<PathBuf> {
        match self.repo.find_active(name).await {
            Ok(Some(record)) => {
                self.log(AuditKind::Read, ctx, &record).await;
                Outcome::Ok(record.content_path)
            }
            Ok(None) => Outcome::NotFound,
            Err(e) => self.internal(&e, ctx),
        }
    }

    /// Stored path and bytes for an active name. Audited like `fetch`.
    pub async fn content(&self, ctx: &ActorContext, name: &str) -> Outcome<(PathBuf, Vec<u8>)> {
        let path = match self.fetch(ctx, name).await {
            Outcome::Ok(p) => p,
            other => return other.map(|p| (p, Vec::new())),
        };
        match self.content.resolve(&path).await {
            Ok(bytes) => Outcome::Ok((path, bytes)),
            Err(e) => self.internal(&e, ctx),
        }
    }

    /// Active records whose name matches `pattern` (a regex; invalid ones match literally),
    /// sorted and deduplicated by name.
    pub async fn search(&self, ctx: &ActorContext, pattern: &str) -> Outcome<Vec<EmoticonRecord>> {
        let re = regex_lite::Regex::new(pattern).or_else(|_| {
            warn!("Invalid search pattern '{}', matching literally", pattern);
            regex_lite::Regex::new(&regex_lite::escape(pattern))
        });
        let re = match re {
            Ok(re) => re,
            Err(e) => return self.internal(&e, ctx),
        };

        let mut found: Vec<EmoticonRecord> = match self.repo.list_active().await {
            Ok(all) => all.into_iter().filter(|r| re.is_match(&r.name)).collect(),
            Err(e) => return self.internal(&e, ctx),
        };
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found.dedup_by(|a, b| a.name == b.name);

        self.log_all(AuditKind::Search, ctx, &found).await;
        Outcome::Ok(found)
    }

    pub async fn get_equivalents(&self, name: &str) -> Outcome<Vec<String>> {
        match self.repo.find_active(name).await {
            Ok(Some(record)) => Outcome::Ok(record.equivalents),
            Ok(None) => Outcome::NotFound,
            Err(e) => self.internal(&e, &ActorContext::new("system", "equivalents")),
        }
    }

    /// Every active member of `name`'s group, via the group index.
    pub async fn group(&self, name: &str) -> Outcome<Vec<EmoticonRecord>> {
        match self.coordinator.members(name).await {
            Ok(mut members) => {
                members.sort_by(|a, b| a.name.cmp(&b.name));
                Outcome::Ok(members)
            }
            Err(e) => self.group_failure(e, &ActorContext::new("system", "group")),
        }
    }

    /// All indexed names, deduplicated, in first-seen order.
    pub async fn list_names(&self) -> Outcome<Vec<String>> {
        match self.repo.list_names().await {
            Ok(entries) => {
                let mut names: Vec<String> = Vec::with_capacity(entries.len());
                for entry in entries {
                    if !names.contains(&entry.name) {
                        names.push(entry.name);
                    }
                }
                Outcome::Ok(names)
            }
            Err(e) => self.internal(&e, &ActorContext::new("system", "list")),
        }
    }

    pub async fn history(&self, name: &str) -> Vec<AuditEntry> {
        self.audit.entries_for(name).await
    }

    // ── Helpers ──

    /// Audit one record; a failed append goes to the error reporter.
    async fn log(&self, kind: AuditKind, ctx: &ActorContext, record: &EmoticonRecord) {
        if let Err(e) = self.audit.record(kind, ctx, record).await {
            self.errors.report(
                &format!("audit {} for '{}' not written: {}", kind, record.name, e),
                ctx,
            );
        }
    }

    async fn log_all(&self, kind: AuditKind, ctx: &ActorContext, records: &[EmoticonRecord]) {
        join_all(records.iter().map(|r| self.log(kind, ctx, r))).await;
    }

    fn internal<T>(&self, err: &dyn std::fmt::Display, ctx: &ActorContext) -> Outcome<T> {
        let report = self.errors.report(err, ctx);
        Outcome::InternalError(report.error)
    }

    fn group_failure<T>(&self, err: GroupError, ctx: &ActorContext) -> Outcome<T> {
        match err {
            GroupError::NotFound(_) => Outcome::NotFound,
            GroupError::NameTaken(_) => Outcome::Conflict,
            other => self.internal(&other, ctx),
        }
    }

    /// A fan-out with failed members is an internal error; applied writes stay.
    fn settle<T>(&self, fan_out: FanOut, ctx: &ActorContext, value: T) -> Outcome<T> {
        if fan_out.is_complete() {
            return Outcome::Ok(value);
        }
        for (member, e) in &fan_out.failures {
            self.errors
                .report(&format!("group write to '{}' failed: {}", member, e), ctx);
        }
        info!(
            "{} of {} group writes failed",
            fan_out.failures.len(),
            fan_out.failures.len() + fan_out.updated.len()
        );
        Outcome::InternalError(format!(
            "{} group member(s) could not be written",
            fan_out.failures.len()
        ))
    }
}
