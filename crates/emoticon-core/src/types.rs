//! Core types — EmoticonRecord, NameIndexEntry, AuditEntry, ActorContext, Outcome.

use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Records ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmoticonRecord {
    pub id: Uuid,
    pub name: String,
    /// Content-addressed file backing this name
    pub content_path: PathBuf,
    /// Synonyms of this name. Old data may hold duplicates; writers avoid them.
    #[serde(default)]
    pub equivalents: Vec<String>,
    /// Stable identity of the equivalence group this record belongs to
    pub group_id: Uuid,
    #[serde(default)]
    pub removed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmoticonRecord {
    /// A fresh active record in its own new group.
    pub fn new(name: &str, content_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            content_path,
            equivalents: Vec::new(),
            group_id: Uuid::new_v4(),
            removed: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.removed
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Append `name` unless already present. Returns whether the list changed.
    pub fn add_equivalent(&mut self, name: &str) -> bool {
        if name == self.name || self.equivalents.iter().any(|e| e == name) {
            return false;
        }
        self.equivalents.push(name.to_string());
        true
    }

    /// Drop every occurrence of `name`. Returns whether the list changed.
    pub fn remove_equivalent(&mut self, name: &str) -> bool {
        let before = self.equivalents.len();
        self.equivalents.retain(|e| e != name);
        before != self.equivalents.len()
    }

    /// This name plus its synonyms, deduplicated, in first-seen order.
    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(self.equivalents.len() + 1);
        for n in self.equivalents.iter().chain(std::iter::once(&self.name)) {
            if !names.contains(n) {
                names.push(n.clone());
            }
        }
        names
    }
}

/// Existence marker for every name ever created (until soft-deleted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameIndexEntry {
    pub name: String,
}

// ── Audit ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditKind {
    Create,
    Read,
    Update,
    Delete,
    Search,
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditKind::Create => write!(f, "create"),
            AuditKind::Read => write!(f, "read"),
            AuditKind::Update => write!(f, "update"),
            AuditKind::Delete => write!(f, "delete"),
            AuditKind::Search => write!(f, "search"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub kind: AuditKind,
    pub timestamp: String,
    /// Rendered `ActorContext`
    pub context: String,
    /// Record snapshot at log time
    pub subject: EmoticonRecord,
}

// ── Actor context ──

/// Who triggered an operation, and with what command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActorContext {
    pub author: String,
    pub content: String,
}

impl ActorContext {
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            content: content.into(),
        }
    }

    /// `[2024. 03. 09. PM 04:05:06] <author> content`
    pub fn render_at(&self, at: DateTime<Local>) -> String {
        format!(
            "[{}] <{}> {}",
            at.format("%Y. %m. %d. %p %I:%M:%S"),
            self.author,
            self.content
        )
    }

    pub fn render(&self) -> String {
        self.render_at(Local::now())
    }
}

impl std::fmt::Display for ActorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}> {}", self.author, self.content)
    }
}

// ── Outcomes ──

/// Result of a service operation. Business-rule misses are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Ok(T),
    /// The name is already taken by an active record
    Conflict,
    /// The name (or duplicate target) has no active record
    NotFound,
    /// Storage, transport or persistence failure; already reported
    InternalError(String),
}

impl<T> Outcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Ok(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Ok(v) => Outcome::Ok(f(v)),
            Outcome::Conflict => Outcome::Conflict,
            Outcome::NotFound => Outcome::NotFound,
            Outcome::InternalError(e) => Outcome::InternalError(e),
        }
    }

    /// Legacy sentinel: 1 ok, -1 conflict, -2 missing, 0 internal.
    pub fn code(&self) -> i32 {
        match self {
            Outcome::Ok(_) => 1,
            Outcome::Conflict => -1,
            Outcome::NotFound => -2,
            Outcome::InternalError(_) => 0,
        }
    }
}

// ── Error reports ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub error: String,
    pub timestamp: String,
    pub context: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_add_equivalent_skips_self_and_duplicates() {
        let mut rec = EmoticonRecord::new("a", PathBuf::from("x.png"));
        assert!(rec.add_equivalent("b"));
        assert!(!rec.add_equivalent("b"));
        assert!(!rec.add_equivalent("a"));
        assert_eq!(rec.equivalents, vec!["b"]);
    }

    #[test]
    fn test_remove_equivalent_drops_all_copies() {
        let mut rec = EmoticonRecord::new("a", PathBuf::from("x.png"));
        rec.equivalents = vec!["b".into(), "c".into(), "b".into()];
        assert!(rec.remove_equivalent("b"));
        assert_eq!(rec.equivalents, vec!["c"]);
        assert!(!rec.remove_equivalent("zzz"));
    }

    #[test]
    fn test_group_names_tolerates_duplicates() {
        let mut rec = EmoticonRecord::new("a", PathBuf::from("x.png"));
        rec.equivalents = vec!["b".into(), "b".into(), "a".into()];
        assert_eq!(rec.group_names(), vec!["b", "a"]);
    }

    #[test]
    fn test_render_context() {
        let ctx = ActorContext::new("alice#0001", "!upload smile");
        let at = Local.with_ymd_and_hms(2024, 3, 9, 16, 5, 6).unwrap();
        assert_eq!(
            ctx.render_at(at),
            "[2024. 03. 09. PM 04:05:06] <alice#0001> !upload smile"
        );
    }

    #[test]
    fn test_outcome_codes() {
        assert_eq!(Outcome::Ok(()).code(), 1);
        assert_eq!(Outcome::<()>::Conflict.code(), -1);
        assert_eq!(Outcome::<()>::NotFound.code(), -2);
        assert_eq!(Outcome::<()>::InternalError("x".into()).code(), 0);
    }

    #[test]
    fn test_audit_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&AuditKind::Search).unwrap(), "\"search\"");
    }
}
