// Network scopes of one sequence
//
// Only participant-attributed scopes are stored. Transit scopes are inferred
// at query time from the gaps between stored scopes within the sequence's
// bounds.

use crate::messages::EndpointId;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

/// Who a slice of a sequence's lifetime is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "endpoint", rename_all = "snake_case")]
pub enum ScopeOwner {
    /// Local processing on one participant
    Participant(EndpointId),
    /// Inferred: no participant accounts for this time, the object is on the wire
    InTransit,
}

/// Reconstructed scope in global time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NetworkScope {
    pub start: f64,
    pub end: f64,
    pub owner: ScopeOwner,
}

impl NetworkScope {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Closed-interval overlap test
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.start <= end && self.end >= start
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ScopeRecord {
    start: f64,
    end: Option<f64>,
    endpoint: EndpointId,
}

/// Append-only record of participant scopes for one sequence
#[derive(Debug, Clone, Default)]
pub struct ScopeTimeline {
    records: Vec<ScopeRecord>,
    /// Index into `records` of each participant's open scope
    open: FnvHashMap<EndpointId, usize>,
}

impl ScopeTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a scope for `endpoint`; false if one is already open
    pub fn open(&mut self, endpoint: EndpointId, at: f64) -> bool {
        if self.open.contains_key(&endpoint) {
            return false;
        }
        self.open.insert(endpoint, self.records.len());
        self.records.push(ScopeRecord {
            start: at,
            end: None,
            endpoint,
        });
        true
    }

    /// Close `endpoint`'s open scope; false if none was open
    pub fn close(&mut self, endpoint: EndpointId, at: f64) -> bool {
        let Some(index) = self.open.remove(&endpoint) else {
            return false;
        };
        let record = &mut self.records[index];
        // A close stamped before its open (clock jitter) yields an empty scope
        record.end = Some(at.max(record.start));
        true
    }

    pub fn is_open(&self, endpoint: EndpointId) -> bool {
        self.open.contains_key(&endpoint)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Tile `[start, end]` with the stored scopes and inferred transit gaps
    ///
    /// Open scopes extend to `end`. Scopes are clipped to the bounds and to
    /// each other so the result never overlaps; zero-length and negative
    /// slices are dropped.
    pub fn reconstruct(&self, start: f64, end: f64) -> Vec<NetworkScope> {
        let mut result = Vec::new();
        if end < start || start.is_nan() || end.is_nan() {
            return result;
        }

        let mut records: Vec<&ScopeRecord> = self.records.iter().collect();
        records.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut cursor = start;
        for record in records {
            let scope_start = record.start.max(cursor);
            let scope_end = record.end.unwrap_or(end).min(end);
            if scope_end <= scope_start {
                continue;
            }
            if scope_start > cursor {
                result.push(NetworkScope {
                    start: cursor,
                    end: scope_start,
                    owner: ScopeOwner::InTransit,
                });
            }
            result.push(NetworkScope {
                start: scope_start,
                end: scope_end,
                owner: ScopeOwner::Participant(record.endpoint),
            });
            cursor = scope_end;
        }

        if end > cursor {
            result.push(NetworkScope {
                start: cursor,
                end,
                owner: ScopeOwner::InTransit,
            });
        }
        result
    }

    /// Reconstructed scopes overlapping the closed window `[window_start, window_end]`
    pub fn reconstruct_window(
        &self,
        start: f64,
        end: f64,
        window_start: f64,
        window_end: f64,
    ) -> Vec<NetworkScope> {
        self.reconstruct(start, end)
            .into_iter()
            .filter(|scope| scope.overlaps(window_start, window_end))
            .collect()
    }
}
