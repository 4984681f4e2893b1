//! Demo: in-memory store + handler registry + poller.
//!
//! Enqueues one task whose handler deliberately lets its first lease lapse,
//! so the run shows a claim, a timeout redelivery, and a completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use tasque_core::{
    Config, HandlerRegistry, InMemoryStore, JobHandler, Poller, RemoveOutcome, SchedulingEngine,
    TaskHandle,
};

struct HelloHandler {
    engine: Arc<SchedulingEngine>,
    remaining_failures: AtomicU32,
}

impl HelloHandler {
    fn new(engine: Arc<SchedulingEngine>, failures: u32) -> Self {
        Self {
            engine,
            remaining_failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl JobHandler for HelloHandler {
    async fn perform(&self, handle: TaskHandle, id: &str, options: Value) {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(id, left, "pretending to crash; the lease will lapse");
            return;
        }

        let name = options
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("world");
        println!("Hello, {name}! (task {id})");

        match self.engine.remove(&handle).await {
            Ok(RemoveOutcome::Removed) => tracing::info!(id, "task completed"),
            Ok(other) => tracing::warn!(id, ?other, "completion lost the race"),
            Err(e) => tracing::error!(id, error = %e, "remove failed"),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tasque_core=debug".into()),
        )
        .init();

    // Short intervals so the redelivery is visible within a few seconds.
    let config = Config {
        wait: Duration::from_millis(200),
        delay: Duration::from_secs(0),
        timeout: Duration::from_secs(2),
        ..Config::default()
    };
    let queue_name = config.queue.clone();

    let store = Arc::new(InMemoryStore::new());
    let engine = Arc::new(SchedulingEngine::new(store.clone(), config));

    let mut registry = HandlerRegistry::new();
    registry
        .register("hello", Arc::new(HelloHandler::new(engine.clone(), 1)))
        .expect("fresh registry");
    let registry = Arc::new(registry);

    let poller = Poller::spawn(engine.clone(), registry);

    let outcome = engine
        .add("greeting", "hello", serde_json::json!({ "name": "tasque" }))
        .await
        .expect("enqueue");
    tracing::info!(?outcome, "task enqueued");

    // Wait until the handler completes and the queue drains.
    while !store.is_empty(&queue_name).await {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    poller.shutdown_and_join().await;
    tracing::info!("queue drained, shutting down");
}
