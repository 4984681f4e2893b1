//! Scheduling engine: add, poll-and-claim, re-score, remove.
//!
//! Every mutation runs as one optimistic transaction against the queue
//! collection: watch, read, build a batch, commit. A concurrent writer makes
//! the commit come back `Conflict`, which surfaces as a typed outcome so the
//! caller can decide whether to retry.

use std::sync::Arc;

use serde_json::Value;

use crate::config::Config;
use crate::dispatch::Dispatch;
use crate::error::TasqueError;
use crate::store::{Batch, CommitOutcome, OrderedStore};
use crate::task::{Member, TaskAttrs, TaskHandle, TaskState};

/// Result of [`SchedulingEngine::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added(TaskHandle),
    /// The queue changed under the transaction; nothing was written. Safe to
    /// call `add` again.
    Conflict,
}

/// Result of one [`SchedulingEngine::handling_queue`] pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A task was claimed, its lease durably written, and the dispatch
    /// callback invoked.
    Dispatched(TaskHandle),

    /// The queue has no members.
    Empty,

    /// The earliest task is not yet eligible.
    NotDue,

    /// Lost the transaction race; nothing was claimed.
    Conflict,
}

impl PollOutcome {
    /// True once a task has been claimed and dispatched in this pass.
    pub fn claimed(&self) -> bool {
        matches!(self, PollOutcome::Dispatched(_))
    }
}

/// Result of [`SchedulingEngine::update_score`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated(TaskHandle),
    /// No member matched the handle's id and score.
    Stale,
    Conflict,
}

/// Result of [`SchedulingEngine::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,

    /// The handle's score no longer matches the store: the task was
    /// reclaimed or redelivered since. Expected when a completion races a
    /// timeout; the redelivery path wins.
    Stale,

    Conflict,
}

/// The scheduling and delivery engine.
///
/// Owns no global state: the store client is injected, and the dispatch
/// callback is passed to `handling_queue` by whoever runs the poll loop
/// (usually [`crate::poller::Poller`]).
pub struct SchedulingEngine {
    store: Arc<dyn OrderedStore>,
    config: Config,
}

impl SchedulingEngine {
    pub fn new(store: Arc<dyn OrderedStore>, config: Config) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Enqueue a task, eligible after the configured delay.
    ///
    /// - A pending entry for `id` already exists: its score stays fixed at
    ///   the first call's value; only the attributes refresh.
    /// - An in-flight entry for `id` exists: its score anchors the base time
    ///   and a second, independent pending entry is created without
    ///   disturbing the lease.
    /// - Otherwise the base time is the store's `now()`.
    pub async fn add(
        &self,
        id: &str,
        job: &str,
        options: Value,
    ) -> Result<AddOutcome, TasqueError> {
        if job.is_empty() {
            return Err(TasqueError::InvalidArgument);
        }

        let queue = self.config.queue.as_str();
        let token = self.store.watch(queue).await?;
        let pending = Member::pending(id);

        if let Some(score) = self.store.score_of(queue, &pending).await? {
            let attrs = TaskAttrs {
                job: job.to_string(),
                options,
                score,
            };
            let batch = Batch::new().put_attrs(pending, attrs);
            return Ok(match self.store.commit(queue, token, batch).await? {
                CommitOutcome::Applied => AddOutcome::Added(TaskHandle::new(id, score)),
                CommitOutcome::Conflict => AddOutcome::Conflict,
            });
        }

        let base = match self.store.score_of(queue, &Member::in_flight(id)).await? {
            Some(score) => score,
            None => self.store.now().await?,
        };
        let score = base + self.config.delay_secs();
        let attrs = TaskAttrs {
            job: job.to_string(),
            options,
            score,
        };
        let batch = Batch::new()
            .upsert(pending.clone(), score)
            .put_attrs(pending, attrs);

        Ok(match self.store.commit(queue, token, batch).await? {
            CommitOutcome::Applied => {
                tracing::debug!(id, job, score, "task added");
                AddOutcome::Added(TaskHandle::new(id, score))
            }
            CommitOutcome::Conflict => AddOutcome::Conflict,
        })
    }

    /// One poll pass: claim the earliest eligible task and dispatch it.
    ///
    /// A pending head transitions to in-flight; an in-flight head whose lease
    /// has lapsed is redelivered under a renewed lease. Either way the new
    /// lease (`now + timeout`) is committed before the callback runs, so a
    /// crash mid-dispatch only costs a redelivery, never the task.
    pub async fn handling_queue(
        &self,
        dispatch: &dyn Dispatch,
    ) -> Result<PollOutcome, TasqueError> {
        let queue = self.config.queue.as_str();
        let token = self.store.watch(queue).await?;

        let Some((member, score)) = self.store.lowest_scored(queue).await? else {
            return Ok(PollOutcome::Empty);
        };
        let now = self.store.now().await?;
        if score > now {
            // Scores order the collection, so if the head is not due,
            // nothing is.
            return Ok(PollOutcome::NotDue);
        }

        let new_score = now + self.config.timeout_secs();
        let Some(mut attrs) = self.store.get_attrs(queue, &member).await? else {
            return Err(TasqueError::MissingAttributes(member.id));
        };
        attrs.score = new_score;

        let in_flight = Member::in_flight(member.id.as_str());
        let batch = match member.state {
            // Previous lease expired without completion: renew and redeliver.
            TaskState::InFlight => Batch::new().upsert(in_flight.clone(), new_score),
            // First claim: pending -> in-flight, attributes move along.
            TaskState::Pending => Batch::new()
                .remove(member.clone())
                .delete_attrs(member.clone())
                .upsert(in_flight.clone(), new_score),
        };
        let batch = batch.put_attrs(in_flight, attrs.clone());

        match self.store.commit(queue, token, batch).await? {
            CommitOutcome::Conflict => Ok(PollOutcome::Conflict),
            CommitOutcome::Applied => {
                let handle = TaskHandle::new(member.id.as_str(), new_score);
                tracing::debug!(
                    id = %member.id,
                    job = %attrs.job,
                    score = new_score,
                    redelivery = member.state.is_in_flight(),
                    "task claimed"
                );
                dispatch
                    .invoke(&attrs.job, handle.clone(), &member.id, attrs.options)
                    .await;
                Ok(PollOutcome::Dispatched(handle))
            }
        }
    }

    /// Move a record identified by `handle` to a new score, attributes and
    /// queue entry together in one batch.
    pub async fn update_score(
        &self,
        handle: &TaskHandle,
        new_score: i64,
    ) -> Result<UpdateOutcome, TasqueError> {
        let queue = self.config.queue.as_str();
        let token = self.store.watch(queue).await?;

        // The in-flight member is the common case (claim, redelivery).
        for member in [
            Member::in_flight(handle.id.as_str()),
            Member::pending(handle.id.as_str()),
        ] {
            if self.store.score_of(queue, &member).await? != Some(handle.score) {
                continue;
            }
            let Some(mut attrs) = self.store.get_attrs(queue, &member).await? else {
                return Err(TasqueError::MissingAttributes(handle.id.clone()));
            };
            attrs.score = new_score;
            let batch = Batch::new()
                .upsert(member.clone(), new_score)
                .put_attrs(member, attrs);
            return Ok(match self.store.commit(queue, token, batch).await? {
                CommitOutcome::Applied => {
                    UpdateOutcome::Updated(TaskHandle::new(handle.id.as_str(), new_score))
                }
                CommitOutcome::Conflict => UpdateOutcome::Conflict,
            });
        }
        Ok(UpdateOutcome::Stale)
    }

    /// Finalize a completed task.
    ///
    /// Compare-and-delete: succeeds only while the handle's score matches
    /// the store's current in-flight score. A mismatch means the task was
    /// already redelivered under a newer lease, and this call becomes a
    /// no-op (`Stale`), keeping "complete" and "timeout redeliver" mutually
    /// exclusive.
    pub async fn remove(&self, handle: &TaskHandle) -> Result<RemoveOutcome, TasqueError> {
        let queue = self.config.queue.as_str();
        let token = self.store.watch(queue).await?;
        let marked = Member::in_flight(handle.id.as_str());

        match self.store.score_of(queue, &marked).await? {
            Some(score) if score == handle.score => {
                let batch = Batch::new().delete_attrs(marked.clone()).remove(marked);
                Ok(match self.store.commit(queue, token, batch).await? {
                    CommitOutcome::Applied => {
                        tracing::debug!(id = %handle.id, score = handle.score, "task removed");
                        RemoveOutcome::Removed
                    }
                    CommitOutcome::Conflict => RemoveOutcome::Conflict,
                })
            }
            _ => Ok(RemoveOutcome::Stale),
        }
    }
}
