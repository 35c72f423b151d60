//! ID generation injected into the engine.
//!
//! State rows get a prefixed, time-ordered identifier (`state_<uuid-v7>`).
//! [`SequentialIds`] yields predictable values for tests.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Source of identifiers for newly created rows.
pub trait IdGenerator: Send + Sync {
    /// ID for a new session state row.
    fn state_id(&self) -> String;
}

/// UUID v7 generator (time-ordered).
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn state_id(&self) -> String {
        format!("state_{}", Uuid::now_v7())
    }
}

/// Deterministic counter-based generator: `state_1`, `state_2`, ...
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    /// Create a generator starting at 1.
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn state_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("state_{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_are_prefixed_v7() {
        let id = UuidIds.state_id();
        let raw = id.strip_prefix("state_").expect("prefix");
        let parsed = Uuid::parse_str(raw).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn uuid_ids_are_unique() {
        let a = UuidIds.state_id();
        let b = UuidIds.state_id();
        assert_ne!(a, b);
    }

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIds::new();
        assert_eq!(ids.state_id(), "state_1");
        assert_eq!(ids.state_id(), "state_2");
        assert_eq!(ids.state_id(), "state_3");
    }
}
