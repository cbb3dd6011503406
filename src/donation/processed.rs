use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

/// Maximum number of donation ids remembered for deduplication.
pub const MAX_PROCESSED_IDS: usize = 2000;

#[derive(Debug, Default)]
struct Inner {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

/// Bounded set of donation ids that have already been evaluated.
///
/// The set and its insertion order live behind one mutex so they can never disagree.
/// Once the cap is exceeded the oldest ids are forgotten first.
#[derive(Debug)]
pub struct ProcessedIds {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl Default for ProcessedIds {
    fn default() -> Self {
        Self::with_capacity(MAX_PROCESSED_IDS)
    }
}

impl ProcessedIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Record `id`. Returns `false` if it was already present.
    pub fn mark(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.ids.insert(id.to_string()) {
            return false;
        }
        inner.order.push_back(id.to_string());

        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.ids.remove(&oldest);
            }
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ids
            .contains(id)
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ids
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
