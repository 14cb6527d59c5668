//! Centralised id generation (Design Notes §9): a single utility so tests
//! can inject a deterministic generator, while production code gets
//! collision-resistant random ids.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generates fresh, unique node ids. Implementations must never reuse an
/// id they have already returned.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// 96+ bits of randomness per id (Design Notes §9: "collision-resistant
/// across processes").
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(20)
            .map(char::from)
            .collect()
    }
}

/// Deterministic, monotonically increasing ids for tests.
#[derive(Debug, Default)]
pub struct CountingIdGenerator {
    next: AtomicU64,
    prefix: String,
}

impl CountingIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            next: AtomicU64::new(0),
            prefix: prefix.into(),
        }
    }
}

impl IdGenerator for CountingIdGenerator {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{n}", self.prefix)
    }
}
