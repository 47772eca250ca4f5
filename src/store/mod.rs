//! The container that owns the canonical comment list.
//!
//! Records only change here. Optimistic updates arrive through
//! [`UpdateSink::on_update`]; each one gets a watcher task that awaits its
//! confirmation and reconciles a failure according to [`ReconcilePolicy`].

use std::{
    collections::VecDeque,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    comments::{
        pagination::PaginationController,
        view::{CommentView, ViewContext},
        Comment, SubjectId,
    },
    mutation::{self, Confirmation, MutationKind, Optimistic, UpdateSink},
};

/// Failures kept for `take_failures`; older entries are dropped.
const FAILURE_LOG_CAPACITY: usize = 256;

/// What to do with an optimistic value whose confirmation failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconcilePolicy {
    /// Undo the rejected toggle on the current record.
    #[default]
    Rollback,
    /// Leave the optimistic value in place.
    KeepApplied,
}

impl FromStr for ReconcilePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rollback" => Ok(ReconcilePolicy::Rollback),
            "keep" | "keep-applied" | "keep_applied" => Ok(ReconcilePolicy::KeepApplied),
            other => Err(format!("unknown reconcile policy '{other}'")),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Comment {0} not found")]
    CommentNotFound(SubjectId),
    #[error("Reply {0} not found")]
    ReplyNotFound(SubjectId),
    #[error("Comment {0} has no older cached replies to show")]
    NoLocalOlderPage(SubjectId),
}

/// A confirmation that came back rejected.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationFailure {
    pub confirmation_id: Uuid,
    pub comment_id: SubjectId,
    pub subject_id: SubjectId,
    pub kind: MutationKind,
    pub message: String,
    pub rolled_back: bool,
}

/// How many instances an ingest created and how many it replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub inserted: usize,
    pub replaced: usize,
}

/// One comment instance: its record plus per-instance UI state.
#[derive(Debug)]
struct Instance {
    record: Comment,
    // Bumped when a re-ingest replaces the record with an authoritative one.
    generation: u64,
    pagination: PaginationController,
}

#[derive(Debug, Default)]
struct StoreInner {
    policy: ReconcilePolicy,
    instances: Mutex<IndexMap<SubjectId, Instance>>,
    failures: Mutex<VecDeque<ConfirmationFailure>>,
    watchers: Mutex<Vec<JoinHandle<()>>>,
    // Serializes every record write (mutate, ingest, rollback) so a
    // read-modify-deliver never overwrites a concurrent change. Taken
    // before `instances`.
    gate: Mutex<()>,
}

#[derive(Clone, Debug, Default)]
pub struct CommentStore {
    inner: Arc<StoreInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CommentStore {
    pub fn new(policy: ReconcilePolicy) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                policy,
                ..StoreInner::default()
            }),
        }
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.inner.policy
    }

    /// Insert or replace records. Replaced instances keep their pagination.
    pub fn ingest(&self, comments: Vec<Comment>) -> IngestSummary {
        let _gate = lock(&self.inner.gate);
        let mut instances = lock(&self.inner.instances);
        let mut summary = IngestSummary::default();

        for comment in comments {
            match instances.get_mut(comment.id()) {
                Some(instance) => {
                    instance.record = comment;
                    instance.generation += 1;
                    summary.replaced += 1;
                }
                None => {
                    instances.insert(
                        comment.id().clone(),
                        Instance {
                            record: comment,
                            generation: 0,
                            pagination: PaginationController::new(),
                        },
                    );
                    summary.inserted += 1;
                }
            }
        }

        info!(
            "Ingested comments: {} new, {} replaced ({} instances)",
            summary.inserted,
            summary.replaced,
            instances.len()
        );
        summary
    }

    pub fn get(&self, id: &SubjectId) -> Option<Comment> {
        lock(&self.inner.instances)
            .get(id)
            .map(|instance| instance.record.clone())
    }

    pub fn view(&self, id: &SubjectId, ctx: &ViewContext) -> Option<CommentView> {
        lock(&self.inner.instances)
            .get(id)
            .map(|instance| CommentView::new(&instance.record, &instance.pagination, ctx))
    }

    pub fn views(&self, ctx: &ViewContext) -> Vec<CommentView> {
        lock(&self.inner.instances)
            .values()
            .map(|instance| CommentView::new(&instance.record, &instance.pagination, ctx))
            .collect()
    }

    /// Advance an instance's `back_page`. Only allowed while older cached
    /// replies are still hidden.
    pub fn show_previous(&self, id: &SubjectId) -> Result<u32, StoreError> {
        let mut instances = lock(&self.inner.instances);
        let instance = instances
            .get_mut(id)
            .ok_or_else(|| StoreError::CommentNotFound(id.clone()))?;

        if !instance
            .pagination
            .window(&instance.record)
            .has_local_older_page()
        {
            return Err(StoreError::NoLocalOlderPage(id.clone()));
        }

        instance.pagination.show_previous();
        debug!(
            "Comment {} back page now {}",
            id,
            instance.pagination.back_page()
        );
        Ok(instance.pagination.back_page())
    }

    /// Run `mutation` against the current record of `id` and deliver its
    /// result to this store. Mutations are applied one at a time.
    pub fn mutate<F, E>(&self, id: &SubjectId, mutation: F) -> Result<(), E>
    where
        F: FnOnce(&Comment) -> Result<Optimistic<Comment>, E>,
        E: From<StoreError>,
    {
        let _gate = lock(&self.inner.gate);
        let current = self
            .get(id)
            .ok_or_else(|| StoreError::CommentNotFound(id.clone()))?;

        mutation(&current)?.deliver(self);
        Ok(())
    }

    /// Drain the failures recorded since the previous call.
    pub fn take_failures(&self) -> Vec<ConfirmationFailure> {
        lock(&self.inner.failures).drain(..).collect()
    }

    /// Wait for every in-flight confirmation to be observed.
    pub async fn settle(&self) {
        loop {
            let pending: Vec<_> = lock(&self.inner.watchers).drain(..).collect();
            if pending.is_empty() {
                return;
            }
            for watcher in pending {
                if let Err(e) = watcher.await {
                    warn!("Confirmation watcher ended abnormally: {}", e);
                }
            }
        }
    }

    fn reconcile(
        &self,
        confirmation_id: Uuid,
        comment_id: SubjectId,
        subject_id: SubjectId,
        kind: MutationKind,
        applied_generation: Option<u64>,
        message: String,
    ) {
        let rolled_back = match (self.inner.policy, applied_generation) {
            (ReconcilePolicy::Rollback, Some(generation)) => {
                self.undo(&comment_id, &subject_id, kind, generation)
            }
            _ => false,
        };

        self.record_failure(ConfirmationFailure {
            confirmation_id,
            comment_id,
            subject_id,
            kind,
            message,
            rolled_back,
        });
    }

    fn undo(
        &self,
        comment_id: &SubjectId,
        subject_id: &SubjectId,
        kind: MutationKind,
        generation: u64,
    ) -> bool {
        let _gate = lock(&self.inner.gate);
        let mut instances = lock(&self.inner.instances);
        let Some(instance) = instances.get_mut(comment_id) else {
            return false;
        };

        if instance.generation != generation {
            warn!(
                "Not rolling back {} on {}: record was re-ingested",
                kind, subject_id
            );
            return false;
        }

        match mutation::revert(&instance.record, subject_id, kind) {
            Some(record) => {
                instance.record = record;
                info!("Rolled back {} on {}", kind, subject_id);
                true
            }
            None => {
                warn!("Not rolling back {}: {} is no longer cached", kind, subject_id);
                false
            }
        }
    }

    fn record_failure(&self, failure: ConfirmationFailure) {
        let mut failures = lock(&self.inner.failures);
        if failures.len() >= FAILURE_LOG_CAPACITY {
            if let Some(dropped) = failures.pop_front() {
                warn!(
                    "Failure log full; dropping confirmation {}",
                    dropped.confirmation_id
                );
            }
        }
        failures.push_back(failure);
    }
}

impl UpdateSink for CommentStore {
    fn on_update(&self, record: Comment, confirmation: Confirmation) {
        let comment_id = record.id().clone();

        let applied_generation = {
            let mut instances = lock(&self.inner.instances);
            match instances.get_mut(&comment_id) {
                Some(instance) => {
                    instance.record = record;
                    Some(instance.generation)
                }
                None => {
                    warn!(
                        "Update for unknown comment {}; tracking confirmation only",
                        comment_id
                    );
                    None
                }
            }
        };

        let store = self.clone();
        let watcher = tokio::spawn(async move {
            let confirmation_id = confirmation.id();
            let subject_id = confirmation.subject().clone();
            let kind = confirmation.kind();

            match confirmation.await {
                Ok(()) => debug!("Confirmed {} on {}", kind, subject_id),
                Err(e) => {
                    warn!("Failed to confirm {} on {}: {}", kind, subject_id, e);
                    store.reconcile(
                        confirmation_id,
                        comment_id,
                        subject_id,
                        kind,
                        applied_generation,
                        e.to_string(),
                    );
                }
            }
        });

        let mut watchers = lock(&self.inner.watchers);
        watchers.retain(|handle| !handle.is_finished());
        watchers.push(watcher);
    }
}
