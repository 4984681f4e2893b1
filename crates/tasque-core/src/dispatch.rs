//! Dispatch port and the name-based handler registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TasqueError;
use crate::task::TaskHandle;

/// Dispatch callback: given a claimed task, invoke the actual work.
///
/// Must not fail for expected business outcomes. The handler finalizes a
/// task by calling `SchedulingEngine::remove` with the handle; if it never
/// does, the lease lapses and the task is redelivered on a later poll.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn invoke(&self, job: &str, handle: TaskHandle, id: &str, options: Value);
}

/// A handler for one named job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn perform(&self, handle: TaskHandle, id: &str, options: Value);
}

/// Registry of handlers (job name -> handler).
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during polling (immutable behind an Arc).
/// This avoids locks entirely.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a job name.
    pub fn register(
        &mut self,
        job: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> Result<(), TasqueError> {
        let job = job.into();
        if self.handlers.contains_key(&job) {
            return Err(TasqueError::DuplicateHandler(job));
        }
        self.handlers.insert(job, handler);
        Ok(())
    }

    pub fn get(&self, job: &str) -> Option<&Arc<dyn JobHandler>> {
        self.handlers.get(job)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl Dispatch for HandlerRegistry {
    async fn invoke(&self, job: &str, handle: TaskHandle, id: &str, options: Value) {
        match self.handlers.get(job) {
            Some(handler) => handler.perform(handle, id, options).await,
            None => {
                // Not fatal: the lease lapses and the task redelivers, so a
                // handler registered later still gets a chance.
                tracing::warn!(job, id, "no handler registered; leaving task to redeliver");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(String, i64, Value)>>,
    }

    #[async_trait]
    impl JobHandler for Recording {
        async fn perform(&self, handle: TaskHandle, id: &str, options: Value) {
            self.calls
                .lock()
                .unwrap()
                .push((id.to_string(), handle.score, options));
        }
    }

    #[tokio::test]
    async fn registry_dispatches_to_the_named_handler() {
        let recording = Arc::new(Recording::default());
        let mut registry = HandlerRegistry::new();
        registry.register("TestJob", recording.clone()).unwrap();

        registry
            .invoke(
                "TestJob",
                TaskHandle::new("abcd", 99),
                "abcd",
                serde_json::json!({"k": "v"}),
            )
            .await;

        let calls = recording.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "abcd");
        assert_eq!(calls[0].1, 99);
        assert_eq!(calls[0].2, serde_json::json!({"k": "v"}));
    }

    #[tokio::test]
    async fn unknown_job_is_dropped_without_panicking() {
        let registry = HandlerRegistry::new();
        registry
            .invoke(
                "Missing",
                TaskHandle::new("abcd", 1),
                "abcd",
                Value::Null,
            )
            .await;
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = HandlerRegistry::new();
        registry
            .register("TestJob", Arc::new(Recording::default()))
            .unwrap();
        let err = registry
            .register("TestJob", Arc::new(Recording::default()))
            .unwrap_err();
        assert!(matches!(err, TasqueError::DuplicateHandler(_)));
        assert_eq!(registry.len(), 1);
    }
}
