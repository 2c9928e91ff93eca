// Object tracks and the start-ordered sequence cache
//
// Sequence ids are not assigned in start order, and a sequence's start can
// still move earlier after it is created. Enumeration therefore goes through
// a cache sorted by start time that is rebuilt lazily: any change that can
// reorder it sets the dirty flag, and the next enumeration re-sorts once.
//
// The cache lives behind a mutex so enumeration works through a shared
// reference. It is logically read-only: callers only ever observe sorted ids.

use super::sequence::Sequence;
use crate::messages::{EndpointId, ProtocolId, SequenceId};
use crate::string_arena::Symbol;
use fnv::FnvHashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy)]
struct OrderEntry {
    start: f64,
    end: f64,
    id: SequenceId,
}

#[derive(Debug, Default)]
struct StartOrder {
    entries: Vec<OrderEntry>,
    /// `max_end[i]` = largest end among `entries[..=i]`
    max_end: Vec<f64>,
    dirty: bool,
    resorts: u64,
}

/// All sequences of one (protocol, object path)
#[derive(Debug)]
pub struct ObjectTrack {
    protocol: ProtocolId,
    path: Symbol,
    sequences: FnvHashMap<SequenceId, Sequence>,
    order: Mutex<StartOrder>,
}

impl ObjectTrack {
    pub(crate) fn new(protocol: ProtocolId, path: Symbol) -> Self {
        Self {
            protocol,
            path,
            sequences: FnvHashMap::default(),
            order: Mutex::new(StartOrder::default()),
        }
    }

    pub fn protocol(&self) -> ProtocolId {
        self.protocol
    }

    /// Object path symbol in the data model's arena
    pub fn path(&self) -> Symbol {
        self.path
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn sequence(&self, id: SequenceId) -> Option<&Sequence> {
        self.sequences.get(&id)
    }

    /// Get or create sequence `id` and record `endpoint` touching it at `at`
    pub(crate) fn touch(&mut self, id: SequenceId, endpoint: EndpointId, at: f64) -> &mut Sequence {
        let order = self.order.get_mut().unwrap_or_else(PoisonError::into_inner);
        let sequence = self.sequences.entry(id).or_insert_with(|| {
            order.dirty = true;
            Sequence::new(id, at)
        });
        if sequence.touch(endpoint, at) {
            order.dirty = true;
        }
        sequence
    }

    /// Record a sink on sequence `id`; false if `endpoint` already sank it
    pub(crate) fn record_sink(&mut self, id: SequenceId, endpoint: EndpointId, at: f64) -> bool {
        let Some(sequence) = self.sequences.get_mut(&id) else {
            return false;
        };
        let recorded = sequence.record_sink(endpoint, at);
        if recorded {
            // Ends feed the overlap search, so a new end invalidates the cache too
            self.order
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .dirty = true;
        }
        recorded
    }

    fn lock_order(&self) -> MutexGuard<'_, StartOrder> {
        self.order.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resort(&self, order: &mut StartOrder) {
        order.entries.clear();
        order
            .entries
            .extend(self.sequences.values().map(|sequence| OrderEntry {
                start: sequence.start(),
                end: sequence.end(),
                id: sequence.id(),
            }));
        order
            .entries
            .sort_by(|a, b| a.start.total_cmp(&b.start).then(a.id.cmp(&b.id)));

        order.max_end.clear();
        let mut running = f64::NEG_INFINITY;
        for entry in &order.entries {
            running = running.max(entry.end);
            order.max_end.push(running);
        }
        order.dirty = false;
        order.resorts += 1;
    }

    /// Ids of sequences whose `[start, end]` intersects `[window_start, window_end]`
    ///
    /// Ordered by start time (ties by id). Boundary contact counts as overlap.
    pub fn enumerate_sequences(&self, window_start: f64, window_end: f64) -> Vec<SequenceId> {
        let mut order = self.lock_order();
        if order.dirty {
            self.resort(&mut order);
        }

        // First entry whose running max end reaches the window is the first
        // sequence that can overlap it; everything earlier ends before it.
        let first = order.max_end.partition_point(|&end| end < window_start);
        order.entries[first..]
            .iter()
            .take_while(|entry| entry.start <= window_end)
            .filter(|entry| entry.end >= window_start)
            .map(|entry| entry.id)
            .collect()
    }

    /// Number of full re-sorts performed so far
    pub fn resort_count(&self) -> u64 {
        self.lock_order().resorts
    }

    pub fn is_order_dirty(&self) -> bool {
        self.lock_order().dirty
    }
}
