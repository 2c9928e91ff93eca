// Replication sequences
//
// A sequence is one replication round of one object. It is created by the
// first message referencing it and moves from Open to Sunk at most once per
// finishing participant; a sunk sequence still accepts processing steps.

use super::network_scope::ScopeTimeline;
use super::processing_steps::StepTimeline;
use crate::messages::{EndpointId, SequenceId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceState {
    /// Not sunk yet; the sequence extends to +infinity
    Open,
    Sunk,
}

/// Final sink of a sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Finish {
    pub end: f64,
    pub endpoint: EndpointId,
}

#[derive(Debug, Clone)]
pub struct Sequence {
    id: SequenceId,
    start: f64,
    finish: Option<Finish>,
    sunk_by: BTreeSet<EndpointId>,
    participants: BTreeSet<EndpointId>,
    scopes: ScopeTimeline,
    steps: BTreeMap<EndpointId, StepTimeline>,
}

impl Sequence {
    pub(crate) fn new(id: SequenceId, start: f64) -> Self {
        Self {
            id,
            start,
            finish: None,
            sunk_by: BTreeSet::new(),
            participants: BTreeSet::new(),
            scopes: ScopeTimeline::new(),
            steps: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> SequenceId {
        self.id
    }

    /// Earliest global time seen for this sequence
    pub fn start(&self) -> f64 {
        self.start
    }

    /// End time, or +infinity while unsunk
    pub fn end(&self) -> f64 {
        self.finish.map_or(f64::INFINITY, |finish| finish.end)
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.start, self.end())
    }

    pub fn finish(&self) -> Option<Finish> {
        self.finish
    }

    pub fn state(&self) -> SequenceState {
        if self.finish.is_some() {
            SequenceState::Sunk
        } else {
            SequenceState::Open
        }
    }

    pub fn was_sunk_by(&self, endpoint: EndpointId) -> bool {
        self.sunk_by.contains(&endpoint)
    }

    pub fn participants(&self) -> impl Iterator<Item = EndpointId> + '_ {
        self.participants.iter().copied()
    }

    pub fn scopes(&self) -> &ScopeTimeline {
        &self.scopes
    }

    pub fn step_participants(&self) -> impl Iterator<Item = EndpointId> + '_ {
        self.steps.keys().copied()
    }

    pub fn steps_of(&self, endpoint: EndpointId) -> Option<&StepTimeline> {
        self.steps.get(&endpoint)
    }

    /// Record that `endpoint` saw this sequence at `at`; true if start moved earlier
    pub(crate) fn touch(&mut self, endpoint: EndpointId, at: f64) -> bool {
        self.participants.insert(endpoint);
        if at < self.start {
            self.start = at;
            true
        } else {
            false
        }
    }

    pub(crate) fn scopes_mut(&mut self) -> &mut ScopeTimeline {
        &mut self.scopes
    }

    pub(crate) fn steps_mut(&mut self, endpoint: EndpointId) -> &mut StepTimeline {
        self.steps.entry(endpoint).or_default()
    }

    /// Record a sink by `endpoint`; false if that endpoint had already sunk it
    ///
    /// With several sinking participants the latest end time wins.
    pub(crate) fn record_sink(&mut self, endpoint: EndpointId, at: f64) -> bool {
        if !self.sunk_by.insert(endpoint) {
            return false;
        }
        match self.finish {
            Some(finish) if finish.end >= at => {}
            _ => self.finish = Some(Finish { end: at, endpoint }),
        }
        true
    }
}
