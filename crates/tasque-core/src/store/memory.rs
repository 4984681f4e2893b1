//! In-memory ordered store implementation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::clock::{Clock, SystemClock};
use super::{Batch, CommitOutcome, OrderedStore, StoreError, WatchToken, WriteOp};
use crate::task::{Member, TaskAttrs};

/// One named collection: scores, sort index, attribute records, and the
/// version counter that backs watch/commit.
#[derive(Debug, Default)]
struct CollectionState {
    scores: HashMap<Member, i64>,

    /// Sort index over (score, member). Score ties break by member order.
    ordered: BTreeSet<(i64, Member)>,

    attrs: HashMap<Member, TaskAttrs>,

    /// Bumped on every applied batch; watch snapshots it, commit compares it.
    version: u64,
}

impl CollectionState {
    fn upsert(&mut self, member: Member, score: i64) {
        if let Some(old) = self.scores.insert(member.clone(), score) {
            self.ordered.remove(&(old, member.clone()));
        }
        self.ordered.insert((score, member));
    }

    fn remove(&mut self, member: &Member) {
        if let Some(old) = self.scores.remove(member) {
            self.ordered.remove(&(old, member.clone()));
        }
    }

    fn apply(&mut self, batch: Batch) {
        for op in batch.ops() {
            match op.clone() {
                WriteOp::Upsert { member, score } => self.upsert(member, score),
                WriteOp::Remove { member } => self.remove(&member),
                WriteOp::PutAttrs { member, attrs } => {
                    self.attrs.insert(member, attrs);
                }
                WriteOp::DeleteAttrs { member } => {
                    self.attrs.remove(&member);
                }
            }
        }
        self.version += 1;
    }
}

/// In-memory [`OrderedStore`].
///
/// Stands in for a real sorted-set server behind the same trait; useful for
/// tests and single-process deployments. Time comes from the injected
/// [`Clock`], preserving the "store is the single time source" contract.
pub struct InMemoryStore {
    collections: Mutex<HashMap<String, CollectionState>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of members in a collection (test and status convenience).
    pub async fn len(&self, collection: &str) -> usize {
        let collections = self.collections.lock().await;
        collections
            .get(collection)
            .map(|c| c.scores.len())
            .unwrap_or(0)
    }

    pub async fn is_empty(&self, collection: &str) -> bool {
        self.len(collection).await == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderedStore for InMemoryStore {
    async fn now(&self) -> Result<i64, StoreError> {
        Ok(self.clock.now())
    }

    async fn watch(&self, collection: &str) -> Result<WatchToken, StoreError> {
        let collections = self.collections.lock().await;
        let version = collections.get(collection).map(|c| c.version).unwrap_or(0);
        Ok(WatchToken::new(version))
    }

    async fn score_of(
        &self,
        collection: &str,
        member: &Member,
    ) -> Result<Option<i64>, StoreError> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .and_then(|c| c.scores.get(member).copied()))
    }

    async fn lowest_scored(
        &self,
        collection: &str,
    ) -> Result<Option<(Member, i64)>, StoreError> {
        let collections = self.collections.lock().await;
        Ok(collections.get(collection).and_then(|c| {
            c.ordered
                .iter()
                .next()
                .map(|(score, member)| (member.clone(), *score))
        }))
    }

    async fn get_attrs(
        &self,
        collection: &str,
        member: &Member,
    ) -> Result<Option<TaskAttrs>, StoreError> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .and_then(|c| c.attrs.get(member).cloned()))
    }

    async fn commit(
        &self,
        collection: &str,
        token: WatchToken,
        batch: Batch,
    ) -> Result<CommitOutcome, StoreError> {
        let mut collections = self.collections.lock().await;
        let state = collections.entry(collection.to_string()).or_default();
        if state.version != token.version() {
            return Ok(CommitOutcome::Conflict);
        }
        state.apply(batch);
        Ok(CommitOutcome::Applied)
    }
}
