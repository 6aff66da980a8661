use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use progress_core::model::{ChapterId, ProgressRecord, StudentId};
use storage::cache::FastCache;
use tracing::{error, warn};

/// Cached mirror of progress records plus their `last_sync` markers.
///
/// Every failure here degrades to a miss on read and a logged no-op on
/// write; the durable store stays the source of truth.
#[derive(Clone)]
pub struct SnapshotCache {
    cache: Arc<dyn FastCache>,
    prefix: String,
    ttl: Duration,
}

impl SnapshotCache {
    #[must_use]
    pub fn new(cache: Arc<dyn FastCache>, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
            ttl,
        }
    }

    /// `progress:{student}:{chapter}`
    #[must_use]
    pub fn record_key(&self, student_id: StudentId, chapter_id: ChapterId) -> String {
        format!("{}{}:{}", self.prefix, student_id, chapter_id)
    }

    /// `progress:{student}:{chapter}:last_sync`
    #[must_use]
    pub fn sync_key(&self, student_id: StudentId, chapter_id: ChapterId) -> String {
        format!("{}:last_sync", self.record_key(student_id, chapter_id))
    }

    pub async fn load(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
    ) -> Option<ProgressRecord> {
        let key = self.record_key(student_id, chapter_id);
        let bytes = match self.cache.get(&key).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(error = %e, key = %key, "cache read failed; falling back to store");
                return None;
            }
        };

        match serde_json::from_slice::<ProgressRecord>(&bytes) {
            Ok(record)
                if record.student_id() == student_id && record.chapter_id() == chapter_id =>
            {
                Some(record)
            }
            Ok(_) => {
                warn!(key = %key, "cached snapshot belongs to another key; ignoring");
                None
            }
            Err(e) => {
                warn!(error = %e, key = %key, "cached snapshot unreadable; ignoring");
                None
            }
        }
    }

    /// Write the snapshot and restart its TTL along with its sync marker's,
    /// so an active key never keeps a snapshot but loses its marker.
    pub async fn store(&self, record: &ProgressRecord) {
        let key = self.record_key(record.student_id(), record.chapter_id());
        let bytes = match serde_json::to_vec(record) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, key = %key, "snapshot serialization failed");
                return;
            }
        };
        if let Err(e) = self.cache.set(&key, &bytes, self.ttl).await {
            warn!(error = %e, key = %key, "cache write failed");
            return;
        }
        self.touch_marker(record.student_id(), record.chapter_id()).await;
    }

    async fn touch_marker(&self, student_id: StudentId, chapter_id: ChapterId) {
        let key = self.sync_key(student_id, chapter_id);
        let marker = match self.cache.get(&key).await {
            Ok(Some(marker)) => marker,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, key = %key, "sync marker read failed");
                return;
            }
        };
        if let Err(e) = self.cache.set(&key, &marker, self.ttl).await {
            warn!(error = %e, key = %key, "sync marker refresh failed");
        }
    }

    /// Time of the last durable write for the key, if known.
    pub async fn last_sync(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
    ) -> Option<DateTime<Utc>> {
        let key = self.sync_key(student_id, chapter_id);
        let bytes = match self.cache.get(&key).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(error = %e, key = %key, "sync marker read failed");
                return None;
            }
        };
        let millis = std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok());
        let Some(millis) = millis else {
            warn!(key = %key, "sync marker unreadable; treating as never synced");
            return None;
        };
        DateTime::<Utc>::from_timestamp_millis(millis)
    }

    /// Record a durable write at `at` (epoch milliseconds).
    pub async fn mark_synced(&self, student_id: StudentId, chapter_id: ChapterId, at: DateTime<Utc>) {
        let key = self.sync_key(student_id, chapter_id);
        let value = at.timestamp_millis().to_string();
        if let Err(e) = self.cache.set(&key, value.as_bytes(), self.ttl).await {
            warn!(error = %e, key = %key, "sync marker write failed");
        }
    }
}
