//! Property-based tests for clock reconciliation
//!
//! Core laws:
//! 1. Converting source → target and back returns the original timestamp
//! 2. Identical wall-clock anchors reduce to a pure local-time translation
//! 3. Conversion preserves ordering and elapsed time

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use replitrace::time_sync::{convert, InitAnchor};

fn wall(offset_micros: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::microseconds(offset_micros)
}

#[test]
fn test_reference_case() {
    let t = Utc.timestamp_opt(1_714_564_800, 0).unwrap();
    let target_wall = t + Duration::seconds(1);
    let source_wall = t + Duration::seconds(3);

    let target_time = convert(target_wall, source_wall, 1.0, 2.0, 7.0);
    assert_eq!(target_time, 8.0);
    assert_eq!(convert(source_wall, target_wall, 2.0, 1.0, target_time), 7.0);
}

#[test]
fn test_sub_second_wall_offsets() {
    let main = InitAnchor::new(wall(0), 10.0);
    let peer = InitAnchor::new(wall(250_000), 0.5);
    // Peer initialized 0.25s after main, so its init instant is main-local 10.25
    assert!((peer.convert_to(&main, 0.5) - 10.25).abs() < 1e-12);
    assert!((peer.convert_to(&main, 1.5) - 11.25).abs() < 1e-12);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_round_trip_is_identity(
        target_offset in -3_600_000_000i64..3_600_000_000,
        source_offset in -3_600_000_000i64..3_600_000_000,
        target_local in 0.0f64..100_000.0,
        source_local in 0.0f64..100_000.0,
        time in 0.0f64..100_000.0,
    ) {
        let target_wall = wall(target_offset);
        let source_wall = wall(source_offset);

        let there = convert(target_wall, source_wall, target_local, source_local, time);
        let back = convert(source_wall, target_wall, source_local, target_local, there);
        prop_assert!((back - time).abs() < 1e-6, "{} != {}", back, time);
    }

    #[test]
    fn prop_same_wall_clock_is_translation(
        target_local in 0.0f64..100_000.0,
        source_local in 0.0f64..100_000.0,
        time in 0.0f64..100_000.0,
    ) {
        let anchor_wall = wall(0);
        let converted = convert(anchor_wall, anchor_wall, target_local, source_local, time);
        let expected = target_local + (time - source_local);
        prop_assert!((converted - expected).abs() < 1e-9);
    }

    #[test]
    fn prop_preserves_elapsed_time(
        source_offset in -3_600_000_000i64..3_600_000_000,
        source_local in 0.0f64..1_000.0,
        a in 0.0f64..10_000.0,
        gap in 0.0f64..10_000.0,
    ) {
        let main = InitAnchor::new(wall(0), 1.0);
        let peer = InitAnchor::new(wall(source_offset), source_local);

        let first = peer.convert_to(&main, a);
        let second = peer.convert_to(&main, a + gap);
        prop_assert!(second >= first);
        prop_assert!(((second - first) - gap).abs() < 1e-6);
    }
}
