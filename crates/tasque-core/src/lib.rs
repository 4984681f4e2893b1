//! tasque-core
//!
//! Delayed-task queue with visibility-timeout redelivery over an ordered
//! key-value store with optimistic (watch/commit) transactions.
//!
//! # Module layout
//! - **task**: task model (state tag, queue member, attributes, handle)
//! - **store**: `OrderedStore` port, in-memory implementation, clock port
//! - **engine**: `SchedulingEngine` (add / handling_queue / update_score / remove)
//! - **dispatch**: `Dispatch` port plus `JobHandler` / `HandlerRegistry`
//! - **poller**: poll loop with graceful shutdown
//! - **config**: wait / delay / timeout / queue name / store URL
//! - **error**: error taxonomy (`thiserror`)
//!
//! Delivery is at-least-once: a handler that never removes its task only
//! delays it until the lease lapses and the poller redelivers it.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod poller;
pub mod store;
pub mod task;

pub use config::Config;
pub use dispatch::{Dispatch, HandlerRegistry, JobHandler};
pub use engine::{AddOutcome, PollOutcome, RemoveOutcome, SchedulingEngine, UpdateOutcome};
pub use error::TasqueError;
pub use poller::Poller;
pub use store::{Clock, InMemoryStore, ManualClock, OrderedStore, SystemClock};
pub use task::{Member, TaskAttrs, TaskHandle, TaskState};
