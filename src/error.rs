//! Error types for capture access and event decoding
//!
//! Only failures of the outer collaborators (catalog lookups, byte streams,
//! malformed capture files) are errors. Inconsistent trace content is
//! reported through `tracing` and absorbed by the aggregator.

use crate::messages::CaptureId;
use thiserror::Error;

/// Errors raised while locating, opening or decoding a capture
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Unknown capture id {0}")]
    UnknownCapture(CaptureId),

    #[error("I/O error reading capture: {0}")]
    Io(#[from] std::io::Error),

    #[error("Capture is missing its header line")]
    MissingHeader,

    #[error("Malformed capture header: {0}")]
    MalformedHeader(#[source] serde_json::Error),

    #[error("Malformed event on line {line}: {source}")]
    MalformedEvent {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Capture header declares a zero cycle frequency")]
    ZeroCycleFrequency,
}

pub type Result<T> = std::result::Result<T, CaptureError>;
