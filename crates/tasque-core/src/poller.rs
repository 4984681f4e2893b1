//! Poll loop: drives `handling_queue` with a fixed sleep between passes.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dispatch::Dispatch;
use crate::engine::SchedulingEngine;

/// Poller handle.
/// - `request_shutdown()` stops the loop after the current pass.
/// - `shutdown_and_join()` additionally waits for it to finish.
pub struct Poller {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl Poller {
    /// Spawn the poll loop. The sleep interval comes from the engine's
    /// configured `wait`.
    pub fn spawn(engine: Arc<SchedulingEngine>, dispatch: Arc<dyn Dispatch>) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            poll_loop(engine, dispatch, &mut shutdown_rx).await;
        });

        Self { shutdown_tx, join }
    }

    /// Request shutdown. In-flight dispatch is not cancelled; the loop just
    /// stops taking new claims.
    pub fn request_shutdown(&self) {
        // ignore send error: the receiver may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

async fn poll_loop(
    engine: Arc<SchedulingEngine>,
    dispatch: Arc<dyn Dispatch>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let wait = engine.config().wait;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // Transient store failures must not kill the loop; log and keep
        // polling.
        if let Err(e) = engine.handling_queue(dispatch.as_ref()).await {
            tracing::warn!(error = %e, "poll pass failed");
        }

        // One sleep per pass, claimed or not, so redelivery cadence stays
        // predictable. A closed channel means the handle was dropped; treat
        // that as shutdown rather than spinning without a sender.
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::config::Config;
    use crate::store::{
        Batch, CommitOutcome, InMemoryStore, ManualClock, OrderedStore, StoreError, WatchToken,
    };
    use crate::task::{Member, TaskAttrs, TaskHandle};

    #[derive(Default)]
    struct CountingDispatch {
        ids: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Dispatch for CountingDispatch {
        async fn invoke(&self, _job: &str, _handle: TaskHandle, id: &str, _options: Value) {
            self.ids.lock().unwrap().push(id.to_string());
        }
    }

    #[tokio::test]
    async fn poller_claims_enqueued_work_and_shuts_down() {
        let clock = ManualClock::at(1_000);
        let store = Arc::new(InMemoryStore::with_clock(clock));
        let config = Config {
            wait: Duration::from_millis(5),
            delay: Duration::from_secs(0),
            ..Config::default()
        };
        let engine = Arc::new(SchedulingEngine::new(store, config));
        let dispatch = Arc::new(CountingDispatch::default());

        engine
            .add("abcd", "TestJob", Value::Null)
            .await
            .unwrap();

        let poller = Poller::spawn(engine, dispatch.clone());

        // Give the loop a few passes to claim the task.
        for _ in 0..50 {
            if !dispatch.ids.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        poller.shutdown_and_join().await;
        assert_eq!(*dispatch.ids.lock().unwrap(), vec!["abcd".to_string()]);
    }

    /// Delegating store that counts poll passes (one `watch` per pass) and
    /// can fail the next N calls with `Unavailable`.
    struct ObservableStore {
        inner: InMemoryStore,
        watches: AtomicUsize,
        failures_left: AtomicUsize,
    }

    impl ObservableStore {
        fn new(inner: InMemoryStore) -> Self {
            Self {
                inner,
                watches: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(0),
            }
        }

        fn watches(&self) -> usize {
            self.watches.load(Ordering::SeqCst)
        }

        fn fail_next(&self, n: usize) {
            self.failures_left.store(n, Ordering::SeqCst);
        }

        fn maybe_fail(&self) -> Result<(), StoreError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Unavailable("injected outage".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl OrderedStore for ObservableStore {
        async fn now(&self) -> Result<i64, StoreError> {
            self.inner.now().await
        }

        async fn watch(&self, collection: &str) -> Result<WatchToken, StoreError> {
            self.watches.fetch_add(1, Ordering::SeqCst);
            self.maybe_fail()?;
            self.inner.watch(collection).await
        }

        async fn score_of(
            &self,
            collection: &str,
            member: &Member,
        ) -> Result<Option<i64>, StoreError> {
            self.inner.score_of(collection, member).await
        }

        async fn lowest_scored(
            &self,
            collection: &str,
        ) -> Result<Option<(Member, i64)>, StoreError> {
            self.inner.lowest_scored(collection).await
        }

        async fn get_attrs(
            &self,
            collection: &str,
            member: &Member,
        ) -> Result<Option<TaskAttrs>, StoreError> {
            self.inner.get_attrs(collection, member).await
        }

        async fn commit(
            &self,
            collection: &str,
            token: WatchToken,
            batch: Batch,
        ) -> Result<CommitOutcome, StoreError> {
            self.inner.commit(collection, token, batch).await
        }
    }

    #[tokio::test]
    async fn dropping_the_poller_stops_the_loop() {
        let clock = ManualClock::at(1_000);
        let store = Arc::new(ObservableStore::new(InMemoryStore::with_clock(clock)));
        let config = Config {
            wait: Duration::from_secs(3600),
            ..Config::default()
        };
        let engine = Arc::new(SchedulingEngine::new(store.clone(), config));
        let dispatch = Arc::new(CountingDispatch::default());

        let poller = Poller::spawn(engine, dispatch);

        // Let the loop reach its sleep.
        for _ in 0..50 {
            if store.watches() >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(store.watches() >= 1);

        // Dropping the handle closes the shutdown channel; the loop must
        // treat that as shutdown instead of spinning without a sleep.
        drop(poller);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let after_drop = store.watches();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            store.watches(),
            after_drop,
            "poll loop kept running after the handle was dropped"
        );
    }

    #[tokio::test]
    async fn poller_survives_a_store_outage() {
        let clock = ManualClock::at(1_000);
        let store = Arc::new(ObservableStore::new(InMemoryStore::with_clock(clock)));
        let config = Config {
            wait: Duration::from_millis(5),
            delay: Duration::from_secs(0),
            ..Config::default()
        };
        let engine = Arc::new(SchedulingEngine::new(store.clone(), config));
        let dispatch = Arc::new(CountingDispatch::default());

        engine.add("abcd", "TestJob", Value::Null).await.unwrap();

        // The next few passes hit an unavailable store; the loop must log
        // and keep polling until it recovers.
        store.fail_next(3);
        let poller = Poller::spawn(engine, dispatch.clone());

        for _ in 0..100 {
            if !dispatch.ids.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        poller.shutdown_and_join().await;
        assert_eq!(*dispatch.ids.lock().unwrap(), vec!["abcd".to_string()]);
        assert!(store.watches() > 3, "claim must happen after the outage");
    }

    #[tokio::test]
    async fn shutdown_interrupts_the_sleep() {
        let store = Arc::new(InMemoryStore::new());
        let config = Config {
            wait: Duration::from_secs(3600),
            ..Config::default()
        };
        let engine = Arc::new(SchedulingEngine::new(store, config));
        let dispatch = Arc::new(CountingDispatch::default());

        let poller = Poller::spawn(engine, dispatch);
        tokio::time::timeout(Duration::from_secs(1), poller.shutdown_and_join())
            .await
            .expect("poller must stop without waiting out the sleep");
    }
}
