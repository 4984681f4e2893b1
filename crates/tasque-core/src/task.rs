//! Task model: state tag, queue member, attributes, and the caller handle.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scheduling state of a queue member.
///
/// State transitions:
/// - Pending -> InFlight (first claim)
/// - InFlight -> InFlight (lease expired, redelivered with a fresh score)
/// - InFlight -> gone (remove with a matching score)
///
/// Design note: an explicit tag instead of a marker prefix on the id, so ids
/// may contain any character and nothing ever strips prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskState {
    /// Enqueued, never claimed. Eligible once its score is due.
    Pending,

    /// Claimed under a lease; the score is the lease expiry.
    InFlight,
}

impl TaskState {
    /// Does this state hold an active lease?
    pub fn is_in_flight(self) -> bool {
        matches!(self, TaskState::InFlight)
    }
}

/// A member of the ordered queue collection: logical task id plus state tag.
///
/// The queue holds at most one member per `(id, state)` pair. A pending and
/// an in-flight member for the same id may coexist (a task re-added while a
/// previous instance is still leased).
///
/// Ordering is id-first so the store has a deterministic tie-break for equal
/// scores; the engine never relies on more than "some total order".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub state: TaskState,
}

impl Member {
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: TaskState::Pending,
        }
    }

    pub fn in_flight(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: TaskState::InFlight,
        }
    }
}

/// Side attributes of a queued task, stored as one record per member.
///
/// `score` is duplicated here so a consumer holding only the record can tell
/// which lease generation it belongs to; the queue's score stays
/// authoritative. Member move and attribute rewrite always travel in the
/// same atomic batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAttrs {
    /// Opaque reference to the unit of work to dispatch.
    pub job: String,

    /// Opaque payload, passed through verbatim to the dispatch callback.
    pub options: Value,

    /// The score this record was written under.
    pub score: i64,
}

/// What `add` and a successful claim hand back to the caller.
///
/// The handle's score is the caller's last-known lease; `remove` succeeds
/// only while it still matches the store's in-flight score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: String,
    pub score: i64,
}

impl TaskHandle {
    pub fn new(id: impl Into<String>, score: i64) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_and_in_flight_are_distinct_members() {
        let a = Member::pending("abcd");
        let b = Member::in_flight("abcd");
        assert_ne!(a, b);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn member_ordering_is_id_first() {
        let mut members = vec![
            Member::in_flight("b"),
            Member::pending("a"),
            Member::in_flight("a"),
        ];
        members.sort();
        assert_eq!(members[0], Member::pending("a"));
        assert_eq!(members[1], Member::in_flight("a"));
        assert_eq!(members[2], Member::in_flight("b"));
    }

    #[test]
    fn attrs_round_trip_through_json() {
        let attrs = TaskAttrs {
            job: "TestJob".to_string(),
            options: serde_json::json!({"retries": 3}),
            score: 1_421_157_737,
        };
        let text = serde_json::to_string(&attrs).unwrap();
        let back: TaskAttrs = serde_json::from_str(&text).unwrap();
        assert_eq!(attrs, back);
    }
}
