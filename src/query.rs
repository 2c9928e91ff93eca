//! Read-only query surface over the data model
//!
//! A [`ReplicationQuery`] holds the model's read lock for its whole lifetime,
//! so every answer it gives comes from one consistent snapshot and the
//! aggregator cannot mutate the model underneath it. Views borrow from the
//! query and never expose mutable model state.
//!
//! # Example
//!
//! ```
//! use replitrace::model::DataModel;
//! use replitrace::query::ReplicationQuery;
//! use std::sync::RwLock;
//!
//! let model = RwLock::new(DataModel::new());
//! let query = ReplicationQuery::lock(&model);
//! assert!(query.protocols().is_empty());
//! assert_eq!(query.participant_name(replitrace::messages::EndpointId(4)), "<unknown endpoint 4>");
//! ```

use crate::messages::{EndpointId, ProtocolId, SequenceId};
use crate::model::{
    DataModel, Finish, NetworkScope, ObjectTrack, Participant, Sequence, SequenceState,
};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

/// Snapshot access to the data model under its read lock
pub struct ReplicationQuery<'a> {
    model: RwLockReadGuard<'a, DataModel>,
}

impl<'a> ReplicationQuery<'a> {
    /// Acquire the read lock; blocks while the aggregator is writing
    pub fn lock(model: &'a RwLock<DataModel>) -> Self {
        Self {
            model: model.read().unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn model(&self) -> &DataModel {
        &self.model
    }

    /// Protocol channels with at least one object track, ascending
    pub fn protocols(&self) -> Vec<ProtocolId> {
        self.model.protocols().map(|(id, _)| id).collect()
    }

    /// Object paths tracked under `protocol`
    pub fn object_paths(&self, protocol: ProtocolId) -> Vec<&str> {
        let Some(channel) = self.model.protocol(protocol) else {
            return Vec::new();
        };
        let mut paths: Vec<&str> = channel
            .objects()
            .filter_map(|track| self.model.resolve(track.path()))
            .collect();
        paths.sort_unstable();
        paths
    }

    pub fn object_track(&self, protocol: ProtocolId, path: &str) -> Option<TrackView<'_>> {
        let symbol = self.model.lookup(path)?;
        let track = self.model.object_track(protocol, symbol)?;
        Some(TrackView {
            model: &self.model,
            track,
        })
    }

    pub fn participants(&self) -> Vec<&Participant> {
        self.model.participants().collect()
    }

    pub fn main_endpoint(&self) -> Option<EndpointId> {
        self.model.main_participant().map(|participant| participant.id)
    }

    /// Display name of `endpoint`, or a placeholder when unknown or unnamed
    pub fn participant_name(&self, endpoint: EndpointId) -> String {
        display_name(&self.model, endpoint)
    }
}

fn display_name(model: &DataModel, endpoint: EndpointId) -> String {
    model
        .participant(endpoint)
        .and_then(|participant| participant.name)
        .and_then(|name| model.resolve(name))
        .map_or_else(|| format!("<unknown endpoint {}>", endpoint), str::to_string)
}

/// One object track
#[derive(Clone, Copy)]
pub struct TrackView<'q> {
    model: &'q DataModel,
    track: &'q ObjectTrack,
}

impl<'q> TrackView<'q> {
    pub fn protocol(&self) -> ProtocolId {
        self.track.protocol()
    }

    pub fn path(&self) -> &'q str {
        self.model.resolve(self.track.path()).unwrap_or_default()
    }

    pub fn sequence_count(&self) -> usize {
        self.track.len()
    }

    /// Sequences intersecting the closed window, ordered by start time
    pub fn enumerate_sequences(&self, window_start: f64, window_end: f64) -> Vec<SequenceId> {
        self.track.enumerate_sequences(window_start, window_end)
    }

    pub fn sequence(&self, id: SequenceId) -> Option<SequenceView<'q>> {
        self.track.sequence(id).map(|sequence| SequenceView {
            model: self.model,
            sequence,
        })
    }
}

/// One sequence of an object track
#[derive(Clone, Copy)]
pub struct SequenceView<'q> {
    model: &'q DataModel,
    sequence: &'q Sequence,
}

/// Processing step box with its name resolved
#[derive(Debug, Clone, PartialEq)]
pub struct StepSpan {
    pub start: f64,
    /// +infinity while the step is still open
    pub end: f64,
    pub depth: u32,
    /// `None` for boxes merged from several narrow steps
    pub name: Option<String>,
    pub count: u32,
}

impl<'q> SequenceView<'q> {
    pub fn id(&self) -> SequenceId {
        self.sequence.id()
    }

    /// `[start, end]` in global time; end is +infinity while unsunk
    pub fn bounds(&self) -> (f64, f64) {
        self.sequence.bounds()
    }

    pub fn state(&self) -> SequenceState {
        self.sequence.state()
    }

    pub fn finish(&self) -> Option<Finish> {
        self.sequence.finish()
    }

    /// Participants that touched this sequence, ascending
    pub fn participants(&self) -> Vec<EndpointId> {
        self.sequence.participants().collect()
    }

    /// Gap-filled network scopes overlapping the closed window, ordered by start
    pub fn network_scopes(&self, window_start: f64, window_end: f64) -> Vec<NetworkScope> {
        let (start, end) = self.sequence.bounds();
        self.sequence
            .scopes()
            .reconstruct_window(start, end, window_start, window_end)
    }

    /// Participants with recorded processing steps, ascending
    pub fn step_participants(&self) -> Vec<EndpointId> {
        self.sequence.step_participants().collect()
    }

    /// Processing steps of `endpoint` overlapping the window, downsampled to `resolution`
    pub fn processing_steps(
        &self,
        endpoint: EndpointId,
        window_start: f64,
        window_end: f64,
        resolution: f64,
    ) -> Vec<StepSpan> {
        let Some(steps) = self.sequence.steps_of(endpoint) else {
            return Vec::new();
        };
        steps
            .query(window_start, window_end, resolution)
            .into_iter()
            .map(|step| StepSpan {
                start: step.start,
                end: step.end,
                depth: step.depth,
                name: step
                    .name
                    .and_then(|name| self.model.resolve(name))
                    .map(str::to_string),
                count: step.count,
            })
            .collect()
    }

    pub fn participant_name(&self, endpoint: EndpointId) -> String {
        display_name(self.model, endpoint)
    }
}
