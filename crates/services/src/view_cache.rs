//! Derived read-side views keyed by student (e.g. the learning-track
//! summary). Any durable progress write makes them stale, so writers evict
//! explicitly at the point of the write.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use progress_core::model::StudentId;
use tracing::debug;

pub trait ViewCache: Send + Sync {
    /// Drop every derived view of `student_id`.
    fn evict(&self, student_id: StudentId);
}

/// Process-local view cache holding opaque JSON documents.
#[derive(Debug, Clone, Default)]
pub struct InMemoryViewCache {
    views: Arc<Mutex<HashMap<StudentId, serde_json::Value>>>,
    evictions: Arc<AtomicUsize>,
}

impl InMemoryViewCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, student_id: StudentId) -> Option<serde_json::Value> {
        self.views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&student_id)
            .cloned()
    }

    pub fn put(&self, student_id: StudentId, view: serde_json::Value) {
        self.views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(student_id, view);
    }

    /// How many times `evict` has been called.
    #[must_use]
    pub fn evictions(&self) -> usize {
        self.evictions.load(Ordering::SeqCst)
    }
}

impl ViewCache for InMemoryViewCache {
    fn evict(&self, student_id: StudentId) {
        self.evictions.fetch_add(1, Ordering::SeqCst);
        let removed = self
            .views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&student_id)
            .is_some();
        debug!(%student_id, removed, "derived views evicted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evict_drops_only_that_student() {
        let cache = InMemoryViewCache::new();
        cache.put(StudentId::new(1), serde_json::json!({"chapters": 3}));
        cache.put(StudentId::new(2), serde_json::json!({"chapters": 5}));

        cache.evict(StudentId::new(1));

        assert!(cache.get(StudentId::new(1)).is_none());
        assert!(cache.get(StudentId::new(2)).is_some());
        assert_eq!(cache.evictions(), 1);
    }
}
