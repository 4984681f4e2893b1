//! Configuration surface consumed by the engine and poller.

use std::time::Duration;

/// Queue configuration.
///
/// Scores are whole epoch seconds, so sub-second `delay`/`timeout` values
/// truncate when applied.
#[derive(Debug, Clone)]
pub struct Config {
    /// Poll interval between `handling_queue` passes.
    pub wait: Duration,

    /// Offset from enqueue to eligibility.
    pub delay: Duration,

    /// In-flight lease duration; after this, an unfinished task redelivers.
    pub timeout: Duration,

    /// Name of the ordered collection holding the queue.
    pub queue: String,

    /// Connection string for a real store backend. The in-memory store
    /// ignores it.
    pub store_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(1),
            delay: Duration::from_secs(5),
            timeout: Duration::from_secs(15),
            queue: "default".to_string(),
            store_url: "redis://localhost:6379/0".to_string(),
        }
    }
}

impl Config {
    pub fn delay_secs(&self) -> i64 {
        self.delay.as_secs() as i64
    }

    pub fn timeout_secs(&self) -> i64 {
        self.timeout.as_secs() as i64
    }
}
