//! Secret id generation

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of candidate secret ids.
///
/// The manager still checks each candidate against the live backends, so a
/// source only has to be unique with overwhelming probability.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random UUID v4 ids
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidSource;

impl IdSource for UuidSource {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic ids for tests: scripted ids first, then `prefix-N`.
#[derive(Debug)]
pub struct SequenceSource {
    prefix: String,
    counter: AtomicU64,
    scripted: Mutex<VecDeque<String>>,
}

impl SequenceSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
            scripted: Mutex::new(VecDeque::new()),
        }
    }

    /// Hand out `ids` in order before falling back to the counter
    pub fn scripted<I, S>(prefix: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let source = Self::new(prefix);
        source
            .scripted
            .lock()
            .extend(ids.into_iter().map(Into::into));
        source
    }
}

impl IdSource for SequenceSource {
    fn next_id(&self) -> String {
        if let Some(id) = self.scripted.lock().pop_front() {
            return id;
        }
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}
