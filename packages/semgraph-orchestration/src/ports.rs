//! Trait-only seams for the external collaborators `spec.md` §1 declares
//! out of scope. No implementation lives in this workspace; these exist
//! so a hosting process can plug in a filesystem watcher, a git-backed
//! revision provider, a snapshot store, or a third-party type checker
//! without the core depending on any of their concrete shapes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
}

/// One debounced filesystem event, `spec.md` §6: `{path, kind}`.
/// Debouncing itself happens upstream; this is just the event shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChangeEvent {
    pub path: String,
    pub kind: FileChangeKind,
}

/// A source of debounced file-change events. Grounded on the original's
/// `backend/codegraph/watcher.py`, whose implementation (debounce timers,
/// OS file-event subscriptions) stays outside this crate.
#[async_trait]
pub trait FileWatcher: Send + Sync {
    async fn next_event(&mut self) -> Option<FileChangeEvent>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionMetadata {
    pub hash: String,
    pub short_hash: String,
    pub message: String,
    pub author: String,
    pub date: String,
}

/// Resolves file content and commit metadata at a given revision.
/// Grounded on the original's `backend/codegraph/git_snapshot.py`, whose
/// git-object reading stays outside this crate.
#[async_trait]
pub trait RevisionContentProvider: Send + Sync {
    async fn content_at(&self, revision: &str, path: &str) -> Option<String>;
    async fn metadata_at(&self, revision: &str) -> Option<RevisionMetadata>;
}

/// Opaque JSON-blob snapshot storage with caller-side set-difference
/// compare, per `spec.md` §1 ("treated as a generic JSON snapshot store
/// with a set-difference compare"). Grounded on the original's
/// `backend/codegraph/snapshot.py` save/get/list shape.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, label: &str, blob: serde_json::Value) -> Result<(), String>;
    async fn get(&self, label: &str) -> Result<Option<serde_json::Value>, String>;
    async fn list(&self) -> Result<Vec<String>, String>;
}

/// An optional third-party static type checker producing additional
/// diagnostics alongside the four conservation laws. `spec.md` §1 lists
/// this as an optional plug-in; no implementation ships here.
#[async_trait]
pub trait TypeCheckerPlugin: Send + Sync {
    async fn check_file(&self, path: &str) -> Vec<String>;
}
