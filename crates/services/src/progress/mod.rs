mod snapshot;
mod sync;

pub use snapshot::SnapshotCache;
pub use sync::{CheatRejection, ProgressSyncService, ReportOutcome, flush_due};
