// Integration test utilities
//
// Builders for NDJSON captures with a 1 kHz cycle clock, so a cycle value of
// N corresponds to N / 1000 local seconds.

#![allow(dead_code)]

use serde_json::{json, Value};

/// Unix seconds of the reference instant `T` used across the tests
pub const T_SECS: i64 = 1_714_564_800;

pub const CYCLE_FREQUENCY: u64 = 1000;

/// NDJSON capture under construction
pub struct CaptureBuilder {
    lines: Vec<String>,
}

impl CaptureBuilder {
    /// Capture created `created_offset_secs` after `T`
    pub fn new(capture_id: u32, created_offset_secs: i64) -> Self {
        let created_at = chrono::DateTime::from_timestamp(T_SECS + created_offset_secs, 0)
            .expect("valid timestamp")
            .to_rfc3339();
        let header = json!({
            "capture_id": capture_id,
            "created_at": created_at,
            "cycle_frequency": CYCLE_FREQUENCY,
        });
        Self {
            lines: vec![header.to_string()],
        }
    }

    fn event(mut self, route: &str, local_seconds: f64, fields: Value) -> Self {
        let cycle = (local_seconds * CYCLE_FREQUENCY as f64).round() as u64;
        self.lines
            .push(json!({ "route": route, "cycle": cycle, "fields": fields }).to_string());
        self
    }

    /// Init at `local_seconds`, with wall clock `T + wall_offset_secs`
    pub fn init(
        self,
        endpoint: u64,
        local_seconds: f64,
        wall_offset_secs: i64,
        name: &str,
    ) -> Self {
        self.event(
            "Init",
            local_seconds,
            json!({
                "EndpointId": endpoint,
                "WallClock": (T_SECS + wall_offset_secs) * 1_000_000,
                "Name": name,
            }),
        )
    }

    /// Object message of kind `route` for (protocol 1, `path`, `sequence`)
    pub fn object(
        self,
        route: &str,
        endpoint: u64,
        local_seconds: f64,
        path: &str,
        sequence: u64,
    ) -> Self {
        self.event(
            route,
            local_seconds,
            json!({
                "EndpointId": endpoint,
                "ProtocolId": 1,
                "SequenceId": sequence,
                "ObjectPath": path,
            }),
        )
    }

    pub fn step_begin(
        self,
        endpoint: u64,
        local_seconds: f64,
        path: &str,
        sequence: u64,
        step: &str,
    ) -> Self {
        self.event(
            "ObjectProcessingBegin",
            local_seconds,
            json!({
                "EndpointId": endpoint,
                "ProtocolId": 1,
                "SequenceId": sequence,
                "ObjectPath": path,
                "StepName": step,
            }),
        )
    }

    pub fn build(self) -> String {
        let mut capture = self.lines.join("\n");
        capture.push('\n');
        capture
    }
}

/// Main capture 1: main Init at local 1.0, wall `T + 1s`
pub fn main_capture() -> CaptureBuilder {
    CaptureBuilder::new(1, 1).init(1, 1.0, 1, "Server")
}

/// Peer capture 2: peer Init at local 2.0, wall `T + 3s`, processing /Game/Foo seq 5 at local 7.0
pub fn peer_capture() -> CaptureBuilder {
    CaptureBuilder::new(2, 3)
        .init(2, 2.0, 3, "Client")
        .step_begin(2, 7.0, "/Game/Foo", 5, "Apply")
}
