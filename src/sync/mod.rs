//! Reconciliation of source tasks against the destination folder.
//!
//! Files are correlated with tasks by the numeric id prefix of their name.
//! Only tasks with a detail document take part in per-file reconciliation;
//! every task appears in the combined summary.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, trace, warn};

use crate::model::remote_file::RemoteFile;
use crate::model::task::Task;
use crate::providers::TaskSource;
use crate::storage::{RemoteStore, StoreError};

pub const SUMMARY_FILENAME: &str = "tasks.md";
pub const COMBINED_JSON_FILENAME: &str = "tasks.json";

/// Remote mtimes within this many seconds of the task's update time count as
/// current.
const MTIME_TOLERANCE_SECS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Delete {
        id: u64,
        filename: String,
    },
    Rename {
        id: u64,
        from: String,
        to: String,
    },
    /// `id` is `None` for the summary document.
    Upload {
        id: Option<u64>,
        filename: String,
        content: String,
    },
}

impl Operation {
    pub fn id(&self) -> Option<u64> {
        match self {
            Operation::Delete { id, .. } | Operation::Rename { id, .. } => Some(*id),
            Operation::Upload { id, .. } => *id,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Delete { filename, .. } => write!(f, "delete {filename}"),
            Operation::Rename { from, to, .. } => write!(f, "rename {from} -> {to}"),
            Operation::Upload { filename, .. } => write!(f, "upload {filename}"),
        }
    }
}

/// The decision for one run. The id sets partition the union of source and
/// destination ids, except that an id may sit in both `to_rename` and
/// `to_update`.
#[derive(Debug, Default)]
pub struct SyncPlan {
    pub new: BTreeSet<u64>,
    pub to_update: BTreeSet<u64>,
    pub to_rename: BTreeSet<u64>,
    pub to_remove: BTreeSet<u64>,
    pub unchanged: BTreeSet<u64>,
    /// Extra remote files sharing an id with the file kept for that id.
    pub duplicates: Vec<(u64, String)>,
    /// New summary content, when the existing one is out of date.
    pub summary: Option<String>,
    /// Deletes first, then renames, then uploads, so content always lands
    /// on the canonical (possibly just renamed) filename.
    pub operations: Vec<Operation>,
}

impl SyncPlan {
    /// Renamed and re-uploaded ids, each counted once.
    pub fn updated_count(&self) -> usize {
        self.to_rename.union(&self.to_update).count()
    }

    pub fn removed_count(&self) -> usize {
        self.to_remove.len() + self.duplicates.len()
    }
}

/// Decide the minimal set of operations that brings `remote_files` in line
/// with `tasks`.
pub fn plan(tasks: &[Task], remote_files: &[RemoteFile]) -> SyncPlan {
    let src: BTreeMap<u64, &Task> = tasks
        .iter()
        .filter(|task| task.has_detail())
        .map(|task| (task.id, task))
        .collect();

    let mut dest: BTreeMap<u64, &RemoteFile> = BTreeMap::new();
    let mut duplicates = Vec::new();
    for file in remote_files.iter().filter(|f| f.is_task_file()) {
        let Some(id) = file.id else { continue };
        match dest.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(file);
            }
            Entry::Occupied(mut slot) => {
                // Prefer the copy that already has the canonical name.
                let canonical = src.get(&id).map(|task| task.filename());
                let dropped = if canonical.as_deref() == Some(file.filename.as_str()) {
                    slot.insert(file)
                } else {
                    file
                };
                warn!(id, filename = %dropped.filename, "Duplicate remote file for task");
                duplicates.push((id, dropped.filename.clone()));
            }
        }
    }

    let src_ids: BTreeSet<u64> = src.keys().copied().collect();
    let dest_ids: BTreeSet<u64> = dest.keys().copied().collect();
    let common = &src_ids & &dest_ids;

    let to_remove = &dest_ids - &src_ids;
    let to_rename: BTreeSet<u64> = common
        .iter()
        .copied()
        .filter(|id| src[id].filename() != dest[id].filename)
        .collect();
    let to_update: BTreeSet<u64> = common
        .iter()
        .copied()
        .filter(|id| is_stale(src[id].updated, dest[id].mtime))
        .collect();
    let new = &src_ids - &dest_ids;
    let unchanged = &common - &(&to_rename | &to_update);

    let mut operations = Vec::new();
    for (id, filename) in &duplicates {
        operations.push(Operation::Delete {
            id: *id,
            filename: filename.clone(),
        });
    }
    for id in &to_remove {
        operations.push(Operation::Delete {
            id: *id,
            filename: dest[id].filename.clone(),
        });
    }
    for id in &to_rename {
        operations.push(Operation::Rename {
            id: *id,
            from: dest[id].filename.clone(),
            to: src[id].filename(),
        });
    }
    for id in &to_update | &new {
        let task = src[&id];
        operations.push(Operation::Upload {
            id: Some(id),
            filename: task.filename(),
            content: task.detail(),
        });
    }

    let summary = document_is_stale(tasks, remote_files, SUMMARY_FILENAME).then(|| {
        tasks
            .iter()
            .map(Task::summary)
            .collect::<Vec<_>>()
            .join("\n")
    });
    if let Some(content) = &summary {
        operations.push(Operation::Upload {
            id: None,
            filename: SUMMARY_FILENAME.to_string(),
            content: content.clone(),
        });
    }

    SyncPlan {
        new,
        to_update,
        to_rename,
        to_remove,
        unchanged,
        duplicates,
        summary,
        operations,
    }
}

/// The source is newer than the destination by more than the tolerance. A
/// destination without a readable mtime is always stale.
fn is_stale(updated: Option<DateTime<Utc>>, mtime: Option<DateTime<Utc>>) -> bool {
    match (updated, mtime) {
        (Some(updated), Some(mtime)) => updated - mtime > Duration::seconds(MTIME_TOLERANCE_SECS),
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Combined documents (summary, JSON export) are rewritten when missing or
/// older than the newest task.
fn document_is_stale(tasks: &[Task], remote_files: &[RemoteFile], filename: &str) -> bool {
    let Some(existing) = remote_files.iter().find(|f| f.filename == filename) else {
        return true;
    };
    let latest = tasks.iter().filter_map(|task| task.updated).max();
    match (existing.mtime, latest) {
        (Some(mtime), Some(latest)) => mtime < latest,
        (None, _) => true,
        (Some(_), None) => false,
    }
}

/// Every task as one pretty-printed JSON array, gated like the summary.
fn combined_json_upload(tasks: &[Task], remote_files: &[RemoteFile]) -> Option<Operation> {
    if !document_is_stale(tasks, remote_files, COMBINED_JSON_FILENAME) {
        return None;
    }
    match serde_json::to_string_pretty(tasks) {
        Ok(content) => Some(Operation::Upload {
            id: None,
            filename: COMBINED_JSON_FILENAME.to_string(),
            content,
        }),
        Err(e) => {
            error!(error = %e, "Failed to serialize tasks");
            None
        }
    }
}

/// Counts for the end-of-run log line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub new: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Remote operations actually issued (none in a dry run).
    pub issued: usize,
    /// Failed remote calls, mkdir included.
    pub failed: usize,
}

pub struct Reconciler<'a> {
    source: &'a dyn TaskSource,
    store: &'a dyn RemoteStore,
    dry_run: bool,
    combined_json: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(source: &'a dyn TaskSource, store: &'a dyn RemoteStore) -> Self {
        Self {
            source,
            store,
            dry_run: false,
            combined_json: false,
        }
    }

    /// Plan and log, but touch nothing remote.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Also keep a `tasks.json` export of every task in the folder.
    pub fn combined_json(mut self, combined_json: bool) -> Self {
        self.combined_json = combined_json;
        self
    }

    /// One full pass: fetch every task, make sure the folder exists, list it,
    /// then converge. Fetch and listing failures abort; individual remote
    /// mutations that fail are logged and counted.
    pub async fn run(&self) -> Result<SyncReport> {
        let tasks = self
            .source
            .fetch_tasks()
            .await
            .with_context(|| format!("Failed to fetch tasks from {}", self.source.name()))?;

        let mut mkdir_failed = false;
        if !self.dry_run {
            if let Err(e) = self.store.mkdir().await {
                error!(error = %e, "Failed to create destination folder");
                mkdir_failed = true;
            }
        }

        let remote_files = self
            .store
            .list()
            .await
            .with_context(|| format!("Failed to list {} destination", self.store.name()))?;
        debug!(count = remote_files.len(), "Listed destination");
        for file in &remote_files {
            trace!(path = %file.path, id = ?file.id, mtime = ?file.mtime, "Remote file");
        }

        let mut report = self.reconcile(&tasks, &remote_files).await;
        if mkdir_failed {
            report.failed += 1;
        }
        Ok(report)
    }

    pub async fn reconcile(&self, tasks: &[Task], remote_files: &[RemoteFile]) -> SyncReport {
        let mut plan = plan(tasks, remote_files);
        if self.combined_json {
            plan.operations.extend(combined_json_upload(tasks, remote_files));
        }
        if plan.summary.is_none() {
            info!("No tasks have changed since the last summary");
        }

        let mut issued = 0;
        let mut failed = 0;
        for op in &plan.operations {
            if self.dry_run {
                info!("Would {op}");
                continue;
            }
            issued += 1;
            if let Err(e) = self.apply(op).await {
                error!(id = ?op.id(), operation = %op, error = %e, "Remote operation failed");
                failed += 1;
            }
        }

        let report = SyncReport {
            new: plan.new.len(),
            updated: plan.updated_count(),
            removed: plan.removed_count(),
            unchanged: plan.unchanged.len(),
            issued,
            failed,
        };
        info!(
            failed = report.failed,
            "Export complete: new={} updated={} removed={} unchanged={}",
            report.new,
            report.updated,
            report.removed,
            report.unchanged
        );
        report
    }

    async fn apply(&self, op: &Operation) -> Result<(), StoreError> {
        debug!(id = ?op.id(), "{op}");
        match op {
            Operation::Delete { filename, .. } => self.store.delete(filename).await,
            Operation::Rename { from, to, .. } => self.store.rename(from, to).await,
            Operation::Upload {
                filename, content, ..
            } => self.store.upload(content, filename).await,
        }
    }
}
