//! Related-capture discovery
//!
//! Captures belonging to the same editing session are not tagged with a
//! shared session id. Instead, a capture counts as related to the main one
//! when both were created within a small tolerance of each other, which holds
//! when every participant starts tracing as the session begins.

use crate::catalog::{CaptureCatalog, CaptureInfo};
use crate::messages::CaptureId;
use chrono::Duration;
use tracing::{debug, warn};

/// Default creation-time tolerance for related captures, in seconds
pub const DEFAULT_TOLERANCE_SECS: f64 = 5.0;

/// Select every other capture created within `tolerance_secs` of `main`
///
/// The window is inclusive on both sides. Returns an empty list (with a
/// warning) when `main` is not in the catalog.
///
/// # Example
///
/// ```
/// use replitrace::catalog::{CaptureCatalog, CaptureInfo, MemoryCatalog};
/// use replitrace::discovery::select_related_captures;
/// use replitrace::messages::CaptureId;
/// use chrono::{Duration, TimeZone, Utc};
///
/// let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
/// let mut catalog = MemoryCatalog::new();
/// catalog.insert(CaptureInfo { id: CaptureId(1), created_at: t }, Vec::<u8>::new());
/// catalog.insert(CaptureInfo { id: CaptureId(2), created_at: t + Duration::seconds(3) }, Vec::<u8>::new());
/// catalog.insert(CaptureInfo { id: CaptureId(3), created_at: t + Duration::seconds(60) }, Vec::<u8>::new());
///
/// let related = select_related_captures(&catalog, CaptureId(1), 5.0);
/// assert_eq!(related.iter().map(|c| c.id).collect::<Vec<_>>(), vec![CaptureId(2)]);
/// ```
pub fn select_related_captures(
    catalog: &dyn CaptureCatalog,
    main: CaptureId,
    tolerance_secs: f64,
) -> Vec<CaptureInfo> {
    let Some(main_info) = catalog.capture_info_by_id(main) else {
        warn!(capture = %main, "Main capture not found in catalog, no peers discovered");
        return Vec::new();
    };

    let tolerance = Duration::microseconds((tolerance_secs.max(0.0) * 1e6) as i64);

    let related: Vec<CaptureInfo> = catalog
        .captures()
        .into_iter()
        .filter(|candidate| candidate.id != main)
        .filter(|candidate| {
            let distance = (candidate.created_at - main_info.created_at).abs();
            distance <= tolerance
        })
        .collect();

    debug!(
        main = %main,
        candidates = catalog.capture_count(),
        related = related.len(),
        "Capture discovery finished"
    );
    related
}
