use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Source of identifiers for new orders, lines, history entries and requests.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self, prefix: &str) -> String;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", Uuid::new_v4())
    }
}

/// Deterministic ids (`ORD-0001`, `ORD-0002`, ...) for fixtures and tests.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    counter: AtomicU64,
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self, prefix: &str) -> String {
        let next = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}-{next:04}")
    }
}

#[cfg(test)]
mod tests {
    use super::{IdGenerator, SequentialIdGenerator, UuidGenerator};

    #[test]
    fn uuid_ids_are_prefixed_and_unique() {
        let first = UuidGenerator.next_id("ORD");
        let second = UuidGenerator.next_id("ORD");

        assert!(first.starts_with("ORD-"));
        assert_ne!(first, second);
    }

    #[test]
    fn sequential_ids_share_one_counter() {
        let ids = SequentialIdGenerator::default();

        assert_eq!(ids.next_id("ORD"), "ORD-0001");
        assert_eq!(ids.next_id("OSH"), "OSH-0002");
    }
}
