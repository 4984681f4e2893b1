//! Ordered store port: the seam between the scheduling engine and whatever
//! sorted-set-with-optimistic-locking backend actually holds the queue.

mod clock;
mod memory;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::InMemoryStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::task::{Member, TaskAttrs};

/// Transport or availability failure from the backing store.
///
/// These are fatal to the operation that hit them; the poller logs and keeps
/// polling. Soft outcomes (conflict, stale handle) are never errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Snapshot of a collection's version, taken by [`OrderedStore::watch`].
///
/// Committing a batch against a token succeeds only if no other writer has
/// touched the collection since the token was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchToken {
    version: u64,
}

impl WatchToken {
    pub(crate) fn new(version: u64) -> Self {
        Self { version }
    }

    pub(crate) fn version(self) -> u64 {
        self.version
    }
}

/// One write inside an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert or overwrite a member's score.
    Upsert { member: Member, score: i64 },

    /// Remove a member (no-op if absent).
    Remove { member: Member },

    /// Insert or overwrite a member's attribute record.
    PutAttrs { member: Member, attrs: TaskAttrs },

    /// Delete a member's attribute record (no-op if absent).
    DeleteAttrs { member: Member },
}

/// An atomic batch of writes against one collection.
///
/// All ops apply together or not at all; see [`OrderedStore::commit`].
#[derive(Debug, Clone, Default)]
pub struct Batch {
    ops: Vec<WriteOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(mut self, member: Member, score: i64) -> Self {
        self.ops.push(WriteOp::Upsert { member, score });
        self
    }

    pub fn remove(mut self, member: Member) -> Self {
        self.ops.push(WriteOp::Remove { member });
        self
    }

    pub fn put_attrs(mut self, member: Member, attrs: TaskAttrs) -> Self {
        self.ops.push(WriteOp::PutAttrs { member, attrs });
        self
    }

    pub fn delete_attrs(mut self, member: Member) -> Self {
        self.ops.push(WriteOp::DeleteAttrs { member });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Did an atomic batch land?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// All ops applied.
    Applied,

    /// The watched collection changed since the token was taken; nothing
    /// applied. The caller may re-read and retry.
    Conflict,
}

/// Ordered store port (interface).
///
/// Design intent:
/// - Reads between `watch` and `commit` are plain reads; the commit is where
///   the optimistic check happens, so at most one of two racing writers can
///   land a batch per collection version.
/// - `now()` is the store's own clock, not the caller's host clock, so every
///   participant compares eligibility against the same time source.
#[async_trait]
pub trait OrderedStore: Send + Sync {
    /// Current store time, epoch seconds.
    async fn now(&self) -> Result<i64, StoreError>;

    /// Begin optimistic monitoring of `collection`.
    async fn watch(&self, collection: &str) -> Result<WatchToken, StoreError>;

    /// Score of `member`, or `None` if absent.
    async fn score_of(&self, collection: &str, member: &Member)
    -> Result<Option<i64>, StoreError>;

    /// The single lowest-scored member, or `None` if the collection is empty.
    /// Score ties break by the member's own ordering.
    async fn lowest_scored(&self, collection: &str)
    -> Result<Option<(Member, i64)>, StoreError>;

    /// Attribute record for `member`, or `None` if absent.
    async fn get_attrs(
        &self,
        collection: &str,
        member: &Member,
    ) -> Result<Option<TaskAttrs>, StoreError>;

    /// Atomically apply `batch` iff the collection is unchanged since `token`.
    async fn commit(
        &self,
        collection: &str,
        token: WatchToken,
        batch: Batch,
    ) -> Result<CommitOutcome, StoreError>;
}
