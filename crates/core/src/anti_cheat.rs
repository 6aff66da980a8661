//! Server-side plausibility check for playback heartbeats.
//!
//! The client never gets to say how much time passed. Elapsed time is measured
//! between the server timestamp of the last accepted mutation and the server
//! clock now, and the reported position jump must fit inside
//! `elapsed * speed_tolerance + grace`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ProgressRecord;
use crate::time::elapsed_seconds;

pub const DEFAULT_SPEED_TOLERANCE: f64 = 1.5;
pub const DEFAULT_GRACE_SECONDS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheatPolicy {
    speed_tolerance: f64,
    grace_seconds: i64,
}

impl Default for CheatPolicy {
    fn default() -> Self {
        Self {
            speed_tolerance: DEFAULT_SPEED_TOLERANCE,
            grace_seconds: DEFAULT_GRACE_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "verdict")]
pub enum CheatVerdict {
    Plausible,
    Suspicious {
        elapsed_seconds: i64,
        reported_delta_seconds: i64,
    },
}

impl CheatPolicy {
    #[must_use]
    pub fn new(speed_tolerance: f64, grace_seconds: i64) -> Self {
        Self {
            speed_tolerance,
            grace_seconds,
        }
    }

    /// Largest position jump accepted after `elapsed` seconds.
    #[must_use]
    pub fn allowance(&self, elapsed: i64) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let elapsed = elapsed as f64;
        #[allow(clippy::cast_precision_loss)]
        let grace = self.grace_seconds as f64;
        elapsed * self.speed_tolerance + grace
    }

    /// Judge a reported position against the snapshot's baseline.
    ///
    /// A snapshot that never accepted a mutation has no baseline and is
    /// always plausible. Backwards seeks are always plausible.
    #[must_use]
    pub fn judge(
        &self,
        baseline: &ProgressRecord,
        current_position: u32,
        now: DateTime<Utc>,
    ) -> CheatVerdict {
        let Some(last_update) = baseline.last_update_time() else {
            return CheatVerdict::Plausible;
        };

        let elapsed = elapsed_seconds(last_update, now);
        let delta = i64::from(current_position) - i64::from(baseline.last_position_seconds());

        #[allow(clippy::cast_precision_loss)]
        let too_fast = delta as f64 > self.allowance(elapsed);
        if too_fast {
            CheatVerdict::Suspicious {
                elapsed_seconds: elapsed,
                reported_delta_seconds: delta,
            }
        } else {
            CheatVerdict::Plausible
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChapterId, StudentId};
    use crate::time::fixed_now;
    use chrono::Duration;

    fn baseline_at_300() -> ProgressRecord {
        let mut r = ProgressRecord::new(StudentId::new(1), ChapterId::new(1));
        r.apply_position(300, fixed_now());
        r
    }

    #[test]
    fn small_step_within_window_is_plausible() {
        let verdict = CheatPolicy::default().judge(
            &baseline_at_300(),
            305,
            fixed_now() + Duration::seconds(2),
        );
        assert_eq!(verdict, CheatVerdict::Plausible);
    }

    #[test]
    fn large_jump_is_suspicious() {
        let verdict = CheatPolicy::default().judge(
            &baseline_at_300(),
            350,
            fixed_now() + Duration::seconds(2),
        );
        assert_eq!(
            verdict,
            CheatVerdict::Suspicious {
                elapsed_seconds: 2,
                reported_delta_seconds: 50,
            }
        );
    }

    #[test]
    fn boundary_is_inclusive() {
        // 2s * 1.5 + 5 = 8
        let verdict = CheatPolicy::default().judge(
            &baseline_at_300(),
            308,
            fixed_now() + Duration::seconds(2),
        );
        assert_eq!(verdict, CheatVerdict::Plausible);
    }

    #[test]
    fn seeking_backwards_is_plausible() {
        let verdict = CheatPolicy::default().judge(&baseline_at_300(), 10, fixed_now());
        assert_eq!(verdict, CheatVerdict::Plausible);
    }

    #[test]
    fn fresh_record_has_no_baseline() {
        let fresh = ProgressRecord::new(StudentId::new(1), ChapterId::new(1));
        let verdict = CheatPolicy::default().judge(&fresh, 1_800, fixed_now());
        assert_eq!(verdict, CheatVerdict::Plausible);
    }

    #[test]
    fn future_baseline_counts_as_zero_elapsed() {
        let verdict = CheatPolicy::default().judge(
            &baseline_at_300(),
            306,
            fixed_now() - Duration::seconds(30),
        );
        assert!(matches!(verdict, CheatVerdict::Suspicious { elapsed_seconds: 0, .. }));
    }
}
