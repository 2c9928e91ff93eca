//! Clock reconciliation between independently started participants
//!
//! Every participant in a session records events on its own local clock
//! (seconds since its process started tracing). Nothing is shared between
//! those clocks except the wall-clock time each participant observed when it
//! emitted its `Init` message. This module maps a local timestamp from one
//! participant onto another participant's local timeline using those anchors.
//!
//! # Design
//!
//! ```text
//!  source timeline      ──┬────────────────────────●───────▶
//!                   SourceLocalAtInit         SourceTime
//!                   (wall = SourceWallAtInit)
//!
//!  target timeline  ──┬──────────────────────────────●─────▶
//!                TargetLocalAtInit               TargetTime
//!                (wall = TargetWallAtInit)
//!
//!  delta          = TargetWallAtInit - SourceWallAtInit
//!  sourceElapsed  = SourceTime - SourceLocalAtInit
//!  targetElapsed  = sourceElapsed - delta
//!  TargetTime     = TargetLocalAtInit + targetElapsed
//! ```
//!
//! The mapping is linear with no drift correction, so swapping the source and
//! target anchors yields the exact inverse.
//!
//! # Foundation
//!
//! - **Cristian (1989). "Probabilistic Clock Synchronization." Distributed Computing.**
//!   - Offset estimation from a single exchanged reference reading
//!   - Application: one wall-clock anchor per participant, offset applied linearly

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wall-clock and local-clock reading captured when a participant initialized
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use replitrace::time_sync::InitAnchor;
///
/// let anchor = InitAnchor::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap(), 1.0);
/// assert_eq!(anchor.local_seconds, 1.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitAnchor {
    /// Wall-clock time at which the participant emitted its Init
    pub wall_clock: DateTime<Utc>,
    /// Participant-local time (seconds) of the Init
    pub local_seconds: f64,
}

impl InitAnchor {
    pub fn new(wall_clock: DateTime<Utc>, local_seconds: f64) -> Self {
        Self {
            wall_clock,
            local_seconds,
        }
    }

    /// Map `local_seconds` on this participant's timeline onto `target`'s timeline
    pub fn convert_to(&self, target: &InitAnchor, local_seconds: f64) -> f64 {
        convert(
            target.wall_clock,
            self.wall_clock,
            target.local_seconds,
            self.local_seconds,
            local_seconds,
        )
    }
}

/// Convert a timestamp on the source participant's timeline to the target's
///
/// # Example
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use replitrace::time_sync::convert;
///
/// let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
/// let target_wall = t + Duration::seconds(1);
/// let source_wall = t + Duration::seconds(3);
///
/// let target_time = convert(target_wall, source_wall, 1.0, 2.0, 7.0);
/// assert_eq!(target_time, 8.0);
///
/// // Swapping the roles is the inverse mapping
/// assert_eq!(convert(source_wall, target_wall, 2.0, 1.0, target_time), 7.0);
/// ```
pub fn convert(
    target_wall_at_init: DateTime<Utc>,
    source_wall_at_init: DateTime<Utc>,
    target_local_at_init: f64,
    source_local_at_init: f64,
    source_time: f64,
) -> f64 {
    let delta = wall_delta_seconds(target_wall_at_init, source_wall_at_init);
    let source_elapsed = source_time - source_local_at_init;
    let target_elapsed = source_elapsed - delta;
    target_local_at_init + target_elapsed
}

/// Signed difference `lhs - rhs` in seconds
fn wall_delta_seconds(lhs: DateTime<Utc>, rhs: DateTime<Utc>) -> f64 {
    let delta = lhs.signed_duration_since(rhs);
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1e9,
        // Beyond ~292 years the nanosecond count overflows i64
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_convert_reference_case() {
        let target = base() + Duration::seconds(1);
        let source = base() + Duration::seconds(3);

        assert_eq!(convert(target, source, 1.0, 2.0, 7.0), 8.0);
        assert_eq!(convert(source, target, 2.0, 1.0, 8.0), 7.0);
    }

    #[test]
    fn test_coincident_wall_clocks_translate_locally() {
        let wall = base();
        // Same wall anchor: pure local translation by the init offset
        assert_eq!(convert(wall, wall, 10.0, 4.0, 6.5), 12.5);
    }

    #[test]
    fn test_identity_when_source_is_target() {
        let anchor = InitAnchor::new(base(), 3.25);
        assert_eq!(anchor.convert_to(&anchor, 42.0), 42.0);
    }

    #[test]
    fn test_sub_second_wall_delta() {
        let target = base();
        let source = base() + Duration::milliseconds(250);
        let result = convert(target, source, 0.0, 0.0, 1.0);
        assert!((result - 1.25).abs() < 1e-9, "got {}", result);
    }

    #[test]
    fn test_anchor_convert_matches_free_function() {
        let main = InitAnchor::new(base() + Duration::seconds(1), 1.0);
        let peer = InitAnchor::new(base() + Duration::seconds(3), 2.0);
        assert_eq!(peer.convert_to(&main, 7.0), 8.0);
        assert_eq!(main.convert_to(&peer, 8.0), 7.0);
    }
}
