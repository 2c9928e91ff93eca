//! Structured trace events and the byte-stream decoder interface
//!
//! The engine never parses bytes itself. A capture's byte stream is handed
//! to an [`EventDecoderFactory`], which yields routed [`TraceEvent`]s with
//! named-field accessors and a monotonic cycle counter.
//!
//! [`NdjsonDecoder`] is the bundled implementation: one JSON header line
//! followed by one JSON object per event.
//!
//! ```text
//! {"capture_id":7,"created_at":"2024-05-01T12:00:00Z","cycle_frequency":1000000}
//! {"route":"Init","cycle":1000000,"fields":{"EndpointId":1,"WallClock":1714564801000000}}
//! {"route":"ObjectProcessingBegin","cycle":6000000,"fields":{"EndpointId":1,"ProtocolId":1,...}}
//! ```

use crate::error::{CaptureError, Result};
use crate::messages::CaptureId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::{BufRead, BufReader, Read};

/// Raw byte stream of one capture
pub type ByteStream = Box<dyn Read + Send>;

/// One routed event with named fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub route: String,
    /// Participant-local monotonic cycle counter
    pub cycle: u64,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// Types readable through [`TraceEvent::value`]
pub trait FieldType: Sized {
    fn from_field(value: &Value) -> Option<Self>;
}

impl FieldType for u64 {
    fn from_field(value: &Value) -> Option<Self> {
        value.as_u64()
    }
}

impl FieldType for i64 {
    fn from_field(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FieldType for u32 {
    fn from_field(value: &Value) -> Option<Self> {
        value.as_u64().and_then(|v| u32::try_from(v).ok())
    }
}

impl FieldType for u16 {
    fn from_field(value: &Value) -> Option<Self> {
        value.as_u64().and_then(|v| u16::try_from(v).ok())
    }
}

impl FieldType for f64 {
    fn from_field(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FieldType for bool {
    fn from_field(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl TraceEvent {
    pub fn new(route: impl Into<String>, cycle: u64) -> Self {
        Self {
            route: route.into(),
            cycle,
            fields: Map::new(),
        }
    }

    /// Builder-style field setter, mostly for tests and synthetic captures
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Typed field accessor; `None` when absent or of the wrong type
    pub fn value<T: FieldType>(&self, field: &str) -> Option<T> {
        self.fields.get(field).and_then(T::from_field)
    }

    pub fn string(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// Sequential reader over one capture's events
pub trait EventStream: Send {
    /// Next event in capture order, or `None` at end of stream
    fn next_event(&mut self) -> Result<Option<TraceEvent>>;

    /// Convert a cycle counter value to participant-local seconds
    fn cycles_to_seconds(&self, cycle: u64) -> f64;
}

/// Opens an [`EventStream`] over a capture byte stream
pub trait EventDecoderFactory: Send + Sync {
    fn open(&self, stream: ByteStream) -> Result<Box<dyn EventStream>>;
}

/// Header line at the top of every NDJSON capture
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureHeader {
    pub capture_id: CaptureId,
    pub created_at: DateTime<Utc>,
    /// Cycles per second of the capture's local clock
    pub cycle_frequency: u64,
}

/// Read the header line from an NDJSON capture
///
/// Blank lines before the header are skipped.
pub fn read_header<R: BufRead>(reader: &mut R) -> Result<CaptureHeader> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(CaptureError::MissingHeader);
        }
        if !line.trim().is_empty() {
            break;
        }
    }
    let header: CaptureHeader =
        serde_json::from_str(line.trim()).map_err(CaptureError::MalformedHeader)?;
    if header.cycle_frequency == 0 {
        return Err(CaptureError::ZeroCycleFrequency);
    }
    Ok(header)
}

/// NDJSON implementation of [`EventDecoderFactory`]
#[derive(Debug, Default, Clone, Copy)]
pub struct NdjsonDecoder;

impl EventDecoderFactory for NdjsonDecoder {
    fn open(&self, stream: ByteStream) -> Result<Box<dyn EventStream>> {
        Ok(Box::new(NdjsonEventStream::new(stream)?))
    }
}

/// Event stream over an NDJSON capture
pub struct NdjsonEventStream<R> {
    reader: BufReader<R>,
    header: CaptureHeader,
    line_number: usize,
    buffer: String,
}

impl<R: Read> NdjsonEventStream<R> {
    pub fn new(reader: R) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        let header = read_header(&mut reader)?;
        Ok(Self {
            reader,
            header,
            line_number: 1,
            buffer: String::new(),
        })
    }

    pub fn header(&self) -> &CaptureHeader {
        &self.header
    }
}

impl<R: Read + Send> EventStream for NdjsonEventStream<R> {
    fn next_event(&mut self) -> Result<Option<TraceEvent>> {
        loop {
            self.buffer.clear();
            if self.reader.read_line(&mut self.buffer)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let line = self.buffer.trim();
            if line.is_empty() {
                continue;
            }
            let event = serde_json::from_str(line).map_err(|source| {
                CaptureError::MalformedEvent {
                    line: self.line_number,
                    source,
                }
            })?;
            return Ok(Some(event));
        }
    }

    fn cycles_to_seconds(&self, cycle: u64) -> f64 {
        cycle as f64 / self.header.cycle_frequency as f64
    }
}
