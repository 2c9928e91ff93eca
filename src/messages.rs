//! Typed replication messages decoded from a capture
//!
//! Six message kinds make up the protocol between the decoder and the
//! aggregator. Every payload is a plain `Copy` value: strings are carried as
//! [`Symbol`] handles into the originating capture's arena, which lets a
//! message move through the cross-thread queue without owning anything.

use crate::string_arena::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one participant (process) in the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(pub u64);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Replication protocol channel namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolId(pub u32);

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Participant-local replication round identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceId(pub u64);

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one recorded trace stream in the capture catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaptureId(pub u32);

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session start of a participant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitMessage {
    pub endpoint: EndpointId,
    pub wall_clock: DateTime<Utc>,
    /// Participant-local time of the Init, in seconds
    pub local_seconds: f64,
    pub name: Option<Symbol>,
    pub is_server: bool,
}

/// (protocol, object path, sequence) triple naming one replication round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub protocol: ProtocolId,
    pub object_path: Symbol,
    pub sequence: SequenceId,
}

/// Object lifecycle event at a participant-local time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectEvent {
    pub endpoint: EndpointId,
    pub object: ObjectRef,
    pub local_seconds: f64,
}

/// Start of a named processing step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessingBegin {
    pub event: ObjectEvent,
    pub step_name: Symbol,
}

/// Closed set of decoded messages
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    Init(InitMessage),
    ObjectProcessingBegin(ProcessingBegin),
    ObjectProcessingEnd(ObjectEvent),
    ObjectTransmissionStart(ObjectEvent),
    ObjectTransmissionReceive(ObjectEvent),
    ObjectSink(ObjectEvent),
}

/// Kind tag of a [`Message`], used for routing tables and statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKind {
    Init,
    ObjectProcessingBegin,
    ObjectProcessingEnd,
    ObjectTransmissionStart,
    ObjectTransmissionReceive,
    ObjectSink,
}

impl MessageKind {
    pub const ALL: [MessageKind; 6] = [
        MessageKind::Init,
        MessageKind::ObjectProcessingBegin,
        MessageKind::ObjectProcessingEnd,
        MessageKind::ObjectTransmissionStart,
        MessageKind::ObjectTransmissionReceive,
        MessageKind::ObjectSink,
    ];

    /// Route name used by the event stream for this kind
    pub fn route_name(self) -> &'static str {
        match self {
            MessageKind::Init => "Init",
            MessageKind::ObjectProcessingBegin => "ObjectProcessingBegin",
            MessageKind::ObjectProcessingEnd => "ObjectProcessingEnd",
            MessageKind::ObjectTransmissionStart => "ObjectTransmissionStart",
            MessageKind::ObjectTransmissionReceive => "ObjectTransmissionReceive",
            MessageKind::ObjectSink => "ObjectSink",
        }
    }

    pub fn from_route_name(route: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.route_name() == route)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.route_name())
    }
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Init(_) => MessageKind::Init,
            Message::ObjectProcessingBegin(_) => MessageKind::ObjectProcessingBegin,
            Message::ObjectProcessingEnd(_) => MessageKind::ObjectProcessingEnd,
            Message::ObjectTransmissionStart(_) => MessageKind::ObjectTransmissionStart,
            Message::ObjectTransmissionReceive(_) => MessageKind::ObjectTransmissionReceive,
            Message::ObjectSink(_) => MessageKind::ObjectSink,
        }
    }

    pub fn endpoint(&self) -> EndpointId {
        match self {
            Message::Init(init) => init.endpoint,
            Message::ObjectProcessingBegin(begin) => begin.event.endpoint,
            Message::ObjectProcessingEnd(event)
            | Message::ObjectTransmissionStart(event)
            | Message::ObjectTransmissionReceive(event)
            | Message::ObjectSink(event) => event.endpoint,
        }
    }

    /// Forward this message to the matching sink method
    pub fn dispatch<S: MessageSink + ?Sized>(self, sink: &mut S) {
        match self {
            Message::Init(init) => sink.on_init(init),
            Message::ObjectProcessingBegin(begin) => sink.on_processing_begin(begin),
            Message::ObjectProcessingEnd(event) => sink.on_processing_end(event),
            Message::ObjectTransmissionStart(event) => sink.on_transmission_start(event),
            Message::ObjectTransmissionReceive(event) => sink.on_transmission_receive(event),
            Message::ObjectSink(event) => sink.on_sink(event),
        }
    }
}

/// Receiver of decoded messages, one method per kind
///
/// Implemented by the aggregator's inline path for the main capture and by
/// the queue producer for peer captures.
pub trait MessageSink {
    fn on_init(&mut self, message: InitMessage);
    fn on_processing_begin(&mut self, message: ProcessingBegin);
    fn on_processing_end(&mut self, message: ObjectEvent);
    fn on_transmission_start(&mut self, message: ObjectEvent);
    fn on_transmission_receive(&mut self, message: ObjectEvent);
    fn on_sink(&mut self, message: ObjectEvent);
}

/// Sink that records every message in arrival order
impl MessageSink for Vec<Message> {
    fn on_init(&mut self, message: InitMessage) {
        self.push(Message::Init(message));
    }

    fn on_processing_begin(&mut self, message: ProcessingBegin) {
        self.push(Message::ObjectProcessingBegin(message));
    }

    fn on_processing_end(&mut self, message: ObjectEvent) {
        self.push(Message::ObjectProcessingEnd(message));
    }

    fn on_transmission_start(&mut self, message: ObjectEvent) {
        self.push(Message::ObjectTransmissionStart(message));
    }

    fn on_transmission_receive(&mut self, message: ObjectEvent) {
        self.push(Message::ObjectTransmissionReceive(message));
    }

    fn on_sink(&mut self, message: ObjectEvent) {
        self.push(Message::ObjectSink(message));
    }
}
