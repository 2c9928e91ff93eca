//! Message decoder: routed trace events → typed replication messages
//!
//! Decoding is pure field extraction. Each recognized route is turned into
//! one [`Message`](crate::messages::Message) variant and forwarded to a
//! [`MessageSink`] in arrival order. String payloads are interned into the
//! capture's arena so the forwarded message stays a plain value.

use crate::event_stream::TraceEvent;
use crate::messages::{
    EndpointId, InitMessage, MessageKind, MessageSink, ObjectEvent, ObjectRef, ProcessingBegin,
    ProtocolId, SequenceId,
};
use crate::string_arena::SharedArena;
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use tracing::{debug, warn};

/// Field names read from routed events
pub mod fields {
    pub const ENDPOINT_ID: &str = "EndpointId";
    pub const WALL_CLOCK: &str = "WallClock";
    pub const NAME: &str = "Name";
    pub const IS_SERVER: &str = "IsServer";
    pub const PROTOCOL_ID: &str = "ProtocolId";
    pub const SEQUENCE_ID: &str = "SequenceId";
    pub const OBJECT_PATH: &str = "ObjectPath";
    pub const STEP_NAME: &str = "StepName";
}

/// Step name used when a processing begin carries none
pub const UNNAMED_STEP: &str = "<unnamed step>";

/// Per-decoder counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub decoded: u64,
    pub unknown_route: u64,
    pub malformed: u64,
}

/// Decodes one capture's events into messages
pub struct MessageDecoder {
    arena: SharedArena,
    unknown_routes: FnvHashMap<String, u64>,
    stats: DecoderStats,
}

impl MessageDecoder {
    pub fn new(arena: SharedArena) -> Self {
        Self {
            arena,
            unknown_routes: FnvHashMap::default(),
            stats: DecoderStats::default(),
        }
    }

    pub fn arena(&self) -> &SharedArena {
        &self.arena
    }

    pub fn stats(&self) -> &DecoderStats {
        &self.stats
    }

    /// Decode `event` and forward the resulting message to `sink`
    ///
    /// `local_seconds` is the event's cycle converted by its stream. Returns
    /// false when the event was not forwarded (unknown route or missing
    /// required fields).
    pub fn decode<S: MessageSink + ?Sized>(
        &mut self,
        event: &TraceEvent,
        local_seconds: f64,
        sink: &mut S,
    ) -> bool {
        let Some(kind) = MessageKind::from_route_name(&event.route) else {
            self.note_unknown_route(&event.route);
            return false;
        };

        let forwarded = match kind {
            MessageKind::Init => self.decode_init(event, local_seconds).map(|m| sink.on_init(m)),
            MessageKind::ObjectProcessingBegin => self
                .decode_object(event, local_seconds)
                .map(|object_event| {
                    let step_name = self
                        .arena
                        .intern(event.string(fields::STEP_NAME).unwrap_or(UNNAMED_STEP));
                    sink.on_processing_begin(ProcessingBegin {
                        event: object_event,
                        step_name,
                    })
                }),
            MessageKind::ObjectProcessingEnd => self
                .decode_object(event, local_seconds)
                .map(|m| sink.on_processing_end(m)),
            MessageKind::ObjectTransmissionStart => self
                .decode_object(event, local_seconds)
                .map(|m| sink.on_transmission_start(m)),
            MessageKind::ObjectTransmissionReceive => self
                .decode_object(event, local_seconds)
                .map(|m| sink.on_transmission_receive(m)),
            MessageKind::ObjectSink => self
                .decode_object(event, local_seconds)
                .map(|m| sink.on_sink(m)),
        };

        match forwarded {
            Some(()) => {
                self.stats.decoded += 1;
                true
            }
            None => {
                self.stats.malformed += 1;
                warn!(
                    route = %event.route,
                    cycle = event.cycle,
                    "Event is missing required fields, skipped"
                );
                false
            }
        }
    }

    fn note_unknown_route(&mut self, route: &str) {
        self.stats.unknown_route += 1;
        let seen = self.unknown_routes.entry(route.to_string()).or_insert(0);
        *seen += 1;
        if *seen == 1 {
            warn!(route, "Unrecognized route id, ignoring");
        } else {
            debug!(route, count = *seen, "Unrecognized route id, ignoring");
        }
    }

    fn decode_init(&self, event: &TraceEvent, local_seconds: f64) -> Option<InitMessage> {
        let endpoint = EndpointId(event.value::<u64>(fields::ENDPOINT_ID)?);
        let wall_clock: DateTime<Utc> =
            DateTime::from_timestamp_micros(event.value::<i64>(fields::WALL_CLOCK)?)?;
        let name = event.string(fields::NAME).map(|name| self.arena.intern(name));
        let is_server = event.value::<bool>(fields::IS_SERVER).unwrap_or(false);

        Some(InitMessage {
            endpoint,
            wall_clock,
            local_seconds,
            name,
            is_server,
        })
    }

    fn decode_object(&self, event: &TraceEvent, local_seconds: f64) -> Option<ObjectEvent> {
        let endpoint = EndpointId(event.value::<u64>(fields::ENDPOINT_ID)?);
        let protocol = ProtocolId(event.value::<u32>(fields::PROTOCOL_ID)?);
        let sequence = SequenceId(event.value::<u64>(fields::SEQUENCE_ID)?);
        let object_path = self.arena.intern(event.string(fields::OBJECT_PATH)?);

        Some(ObjectEvent {
            endpoint,
            object: ObjectRef {
                protocol,
                object_path,
                sequence,
            },
            local_seconds,
        })
    }
}
