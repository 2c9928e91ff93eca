//! Replication data model
//!
//! The model holds everything the aggregator has learned, in global time
//! (the main participant's timeline):
//!
//! ```text
//! DataModel
//! ├─ participants: EndpointId → Participant (Init anchor, name, server flag)
//! └─ protocols: ProtocolId
//!    └─ object tracks: object path → ObjectTrack
//!       └─ sequences: SequenceId → Sequence
//!          ├─ start (monotone min) / finish (end, finishing participant)
//!          ├─ participants that touched it
//!          ├─ network scopes (one open scope per participant at most)
//!          └─ processing steps per participant (nested, depth = row)
//! ```
//!
//! The model is mutated only by the aggregator's foreground thread. Readers
//! go through [`crate::query`] while holding the aggregator's read lock.
//! Strings are owned by the model's own arena; nothing here references a
//! capture worker's arena.

mod network_scope;
mod object_track;
mod participant;
mod processing_steps;
mod sequence;

pub use network_scope::{NetworkScope, ScopeOwner, ScopeTimeline};
pub use object_track::ObjectTrack;
pub use participant::{Participant, Registration};
pub use processing_steps::{ProcessingStep, StepBox, StepTimeline};
pub use sequence::{Finish, Sequence, SequenceState};

use crate::messages::{CaptureId, EndpointId, ProtocolId, SequenceId};
use crate::string_arena::{StringArena, Symbol};
use crate::time_sync::InitAnchor;
use std::collections::BTreeMap;

/// Key of one sequence, with the object path interned in the model's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceKey {
    pub protocol: ProtocolId,
    pub path: Symbol,
    pub sequence: SequenceId,
}

/// Outcome of a scope open/close request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeChange {
    Opened,
    Closed,
    /// Open requested while the participant already has one open
    AlreadyOpen,
    /// Close requested with nothing open
    NotOpen,
    /// Open refused because the participant already sank the sequence
    AlreadySunk,
}

/// Object tracks of one protocol channel
#[derive(Debug, Default)]
pub struct ProtocolChannel {
    objects: BTreeMap<Symbol, ObjectTrack>,
}

impl ProtocolChannel {
    pub fn objects(&self) -> impl Iterator<Item = &ObjectTrack> {
        self.objects.values()
    }

    pub fn object(&self, path: Symbol) -> Option<&ObjectTrack> {
        self.objects.get(&path)
    }
}

#[derive(Debug, Default)]
pub struct DataModel {
    strings: StringArena,
    participants: BTreeMap<EndpointId, Participant>,
    main_endpoint: Option<EndpointId>,
    protocols: BTreeMap<ProtocolId, ProtocolChannel>,
}

impl DataModel {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- strings -----

    pub fn intern(&mut self, value: &str) -> Symbol {
        self.strings.intern(value)
    }

    pub fn resolve(&self, symbol: Symbol) -> Option<&str> {
        self.strings.resolve(symbol)
    }

    pub fn lookup(&self, value: &str) -> Option<Symbol> {
        self.strings.get(value)
    }

    pub(crate) fn strings_mut(&mut self) -> &mut StringArena {
        &mut self.strings
    }

    // ----- participants -----

    /// Register a participant from its Init
    ///
    /// Only the first Init of an endpoint is kept; later ones report whether
    /// they came from the same capture or a different one.
    pub fn register_participant(
        &mut self,
        id: EndpointId,
        capture: CaptureId,
        anchor: InitAnchor,
        name: Option<Symbol>,
        is_server: bool,
        is_main: bool,
    ) -> Registration {
        if let Some(existing) = self.participants.get(&id) {
            return if existing.capture == capture {
                Registration::Duplicate
            } else {
                Registration::Ambiguous {
                    existing: existing.capture,
                }
            };
        }
        if is_main {
            self.main_endpoint = Some(id);
        }
        self.participants.insert(
            id,
            Participant {
                id,
                name,
                is_server,
                anchor,
                is_main,
                capture,
            },
        );
        Registration::Created
    }

    /// Attach a display name to a registered participant
    pub fn set_participant_name(&mut self, id: EndpointId, name: Symbol) -> bool {
        match self.participants.get_mut(&id) {
            Some(participant) => {
                participant.name = Some(name);
                true
            }
            None => false,
        }
    }

    pub fn participant(&self, id: EndpointId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn main_participant(&self) -> Option<&Participant> {
        self.main_endpoint.and_then(|id| self.participants.get(&id))
    }

    // ----- object tracks -----

    pub fn protocols(&self) -> impl Iterator<Item = (ProtocolId, &ProtocolChannel)> {
        self.protocols.iter().map(|(id, channel)| (*id, channel))
    }

    pub fn protocol(&self, id: ProtocolId) -> Option<&ProtocolChannel> {
        self.protocols.get(&id)
    }

    pub fn object_track(&self, protocol: ProtocolId, path: Symbol) -> Option<&ObjectTrack> {
        self.protocols.get(&protocol)?.objects.get(&path)
    }

    pub fn sequence(&self, key: SequenceKey) -> Option<&Sequence> {
        self.object_track(key.protocol, key.path)?
            .sequence(key.sequence)
    }

    /// Object track for (protocol, path), materialized on first use
    fn object_track_mut(&mut self, protocol: ProtocolId, path: Symbol) -> &mut ObjectTrack {
        self.protocols
            .entry(protocol)
            .or_default()
            .objects
            .entry(path)
            .or_insert_with(|| ObjectTrack::new(protocol, path))
    }

    /// Get or create the sequence and fold `at` into its start and membership
    pub fn touch_sequence(
        &mut self,
        key: SequenceKey,
        endpoint: EndpointId,
        at: f64,
    ) -> &mut Sequence {
        self.object_track_mut(key.protocol, key.path)
            .touch(key.sequence, endpoint, at)
    }

    // ----- lifecycle operations (global time) -----

    /// Begin a processing step; returns the step's depth
    pub fn begin_processing_step(
        &mut self,
        key: SequenceKey,
        endpoint: EndpointId,
        at: f64,
        name: Symbol,
    ) -> u32 {
        self.touch_sequence(key, endpoint, at)
            .steps_mut(endpoint)
            .begin(at, name)
    }

    /// End the innermost open processing step; false if none was open
    pub fn end_processing_step(&mut self, key: SequenceKey, endpoint: EndpointId, at: f64) -> bool {
        self.touch_sequence(key, endpoint, at)
            .steps_mut(endpoint)
            .end(at)
            .is_some()
    }

    /// Transmission start: the participant stops processing, the object is in flight
    pub fn close_scope(&mut self, key: SequenceKey, endpoint: EndpointId, at: f64) -> ScopeChange {
        if self.touch_sequence(key, endpoint, at).scopes_mut().close(endpoint, at) {
            ScopeChange::Closed
        } else {
            ScopeChange::NotOpen
        }
    }

    /// Transmission receive: the participant resumes processing
    pub fn open_scope(&mut self, key: SequenceKey, endpoint: EndpointId, at: f64) -> ScopeChange {
        let sequence = self.touch_sequence(key, endpoint, at);
        if sequence.was_sunk_by(endpoint) {
            return ScopeChange::AlreadySunk;
        }
        if sequence.scopes_mut().open(endpoint, at) {
            ScopeChange::Opened
        } else {
            ScopeChange::AlreadyOpen
        }
    }

    /// Sink: close any open scope and record the sequence's finish
    ///
    /// Returns false when `endpoint` had already sunk this sequence.
    pub fn sink_sequence(&mut self, key: SequenceKey, endpoint: EndpointId, at: f64) -> bool {
        self.touch_sequence(key, endpoint, at)
            .scopes_mut()
            .close(endpoint, at);
        self.object_track_mut(key.protocol, key.path)
            .record_sink(key.sequence, endpoint, at)
    }
}
