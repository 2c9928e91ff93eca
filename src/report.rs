//! Replication report: a serializable snapshot of the query surface
//!
//! Built from a [`ReplicationQuery`] over the full time range and rendered
//! either as indented text or as pretty JSON. Unbounded ends (unsunk
//! sequences, open steps, trailing transit) are reported as `null` in JSON
//! and as `open` in text.

use crate::aggregator::AggregatorStats;
use crate::messages::{CaptureId, EndpointId, ProtocolId, SequenceId};
use crate::model::{ScopeOwner, SequenceState};
use crate::query::{ReplicationQuery, SequenceView};
use crate::worker::WorkerStats;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportParticipant {
    pub id: EndpointId,
    pub name: String,
    pub is_server: bool,
    pub is_main: bool,
    pub capture: CaptureId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportScope {
    pub start: f64,
    /// `None` when the scope extends to +infinity
    pub end: Option<f64>,
    pub owner: ScopeOwner,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportStep {
    pub start: f64,
    pub end: Option<f64>,
    pub depth: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportStepRow {
    pub endpoint: EndpointId,
    pub steps: Vec<ReportStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSequence {
    pub id: SequenceId,
    pub start: f64,
    pub end: Option<f64>,
    pub state: SequenceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_by: Option<EndpointId>,
    pub participants: Vec<EndpointId>,
    pub scopes: Vec<ReportScope>,
    pub processing: Vec<ReportStepRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportObject {
    pub path: String,
    pub sequences: Vec<ReportSequence>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProtocol {
    pub id: ProtocolId,
    pub objects: Vec<ReportObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportWorker {
    pub capture: CaptureId,
    pub pushed: u64,
    pub popped: u64,
    pub pending: usize,
    pub finished: bool,
}

impl From<WorkerStats> for ReportWorker {
    fn from(stats: WorkerStats) -> Self {
        Self {
            capture: stats.capture,
            pushed: stats.queue.total_pushed,
            popped: stats.queue.total_popped,
            pending: stats.queue.pending,
            finished: stats.finished,
        }
    }
}

/// Everything known about one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationReport {
    /// Format version identifier
    pub version: String,
    /// Format name
    pub format: String,
    pub main_capture: CaptureId,
    pub peer_captures: Vec<ReportWorker>,
    pub participants: Vec<ReportParticipant>,
    pub protocols: Vec<ReportProtocol>,
    pub stats: AggregatorStats,
}

fn bounded(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn sequence_entry(sequence: &SequenceView<'_>) -> ReportSequence {
    let (start, end) = sequence.bounds();
    let scopes = sequence
        .network_scopes(f64::NEG_INFINITY, f64::INFINITY)
        .into_iter()
        .map(|scope| ReportScope {
            start: scope.start,
            end: bounded(scope.end),
            owner: scope.owner,
        })
        .collect();
    let processing = sequence
        .step_participants()
        .into_iter()
        .map(|endpoint| ReportStepRow {
            endpoint,
            steps: sequence
                .processing_steps(endpoint, f64::NEG_INFINITY, f64::INFINITY, 0.0)
                .into_iter()
                .map(|step| ReportStep {
                    start: step.start,
                    end: bounded(step.end),
                    depth: step.depth,
                    name: step.name,
                    count: step.count,
                })
                .collect(),
        })
        .collect();

    ReportSequence {
        id: sequence.id(),
        start,
        end: bounded(end),
        state: sequence.state(),
        finished_by: sequence.finish().map(|finish| finish.endpoint),
        participants: sequence.participants(),
        scopes,
        processing,
    }
}

impl ReplicationReport {
    pub fn build(
        query: &ReplicationQuery<'_>,
        main_capture: CaptureId,
        workers: Vec<WorkerStats>,
        stats: AggregatorStats,
    ) -> Self {
        let participants = query
            .participants()
            .into_iter()
            .map(|participant| ReportParticipant {
                id: participant.id,
                name: query.participant_name(participant.id),
                is_server: participant.is_server,
                is_main: participant.is_main,
                capture: participant.capture,
            })
            .collect();

        let protocols = query
            .protocols()
            .into_iter()
            .map(|protocol| ReportProtocol {
                id: protocol,
                objects: query
                    .object_paths(protocol)
                    .into_iter()
                    .filter_map(|path| query.object_track(protocol, path))
                    .map(|track| ReportObject {
                        path: track.path().to_string(),
                        sequences: track
                            .enumerate_sequences(f64::NEG_INFINITY, f64::INFINITY)
                            .into_iter()
                            .filter_map(|id| track.sequence(id))
                            .map(|sequence| sequence_entry(&sequence))
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "replitrace-json-v1".to_string(),
            main_capture,
            peer_captures: workers.into_iter().map(ReportWorker::from).collect(),
            participants,
            protocols,
            stats,
        }
    }

    pub fn sequence_count(&self) -> usize {
        self.protocols
            .iter()
            .flat_map(|protocol| &protocol.objects)
            .map(|object| object.sequences.len())
            .sum()
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable rendering
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "=== Replication Analysis (capture {}) ===", self.main_capture)?;
        writeln!(out)?;

        writeln!(out, "Participants:")?;
        for participant in &self.participants {
            let mut tags = Vec::new();
            if participant.is_main {
                tags.push("main");
            }
            if participant.is_server {
                tags.push("server");
            }
            writeln!(
                out,
                "  [{}] {} (capture {}){}",
                participant.id,
                participant.name,
                participant.capture,
                if tags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", tags.join(", "))
                }
            )?;
        }

        if !self.peer_captures.is_empty() {
            writeln!(out)?;
            writeln!(out, "Peer captures:")?;
            for worker in &self.peer_captures {
                writeln!(
                    out,
                    "  capture {}: {} decoded, {} aggregated, {} pending{}",
                    worker.capture,
                    worker.pushed,
                    worker.popped,
                    worker.pending,
                    if worker.finished { "" } else { " (running)" }
                )?;
            }
        }

        for protocol in &self.protocols {
            writeln!(out)?;
            writeln!(out, "Protocol {}:", protocol.id)?;
            for object in &protocol.objects {
                writeln!(out, "  {}", object.path)?;
                for sequence in &object.sequences {
                    writeln!(
                        out,
                        "    seq {:<6} {:>12.6} .. {:<12} {:?}",
                        sequence.id,
                        sequence.start,
                        format_end(sequence.end),
                        sequence.state
                    )?;
                    for scope in &sequence.scopes {
                        let owner = match scope.owner {
                            ScopeOwner::Participant(endpoint) => format!("endpoint {}", endpoint),
                            ScopeOwner::InTransit => "in transit".to_string(),
                        };
                        writeln!(
                            out,
                            "      {:>12.6} .. {:<12} {}",
                            scope.start,
                            format_end(scope.end),
                            owner
                        )?;
                    }
                    for row in &sequence.processing {
                        for step in &row.steps {
                            writeln!(
                                out,
                                "      endpoint {} {:indent$}{} {:.6} .. {}",
                                row.endpoint,
                                "",
                                step.name.as_deref().unwrap_or("<merged>"),
                                step.start,
                                format_end(step.end),
                                indent = step.depth as usize * 2
                            )?;
                        }
                    }
                }
            }
        }

        writeln!(out)?;
        writeln!(
            out,
            "{} sequences, {} messages aggregated, {} dropped before Init",
            self.sequence_count(),
            self.stats.aggregated,
            self.stats.dropped_missing_init
        )?;
        Ok(())
    }
}

fn format_end(end: Option<f64>) -> String {
    end.map_or_else(|| "open".to_string(), |end| format!("{:.6}", end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataModel, SequenceKey};
    use crate::time_sync::InitAnchor;
    use chrono::{TimeZone, Utc};
    use std::sync::RwLock;

    fn model() -> RwLock<DataModel> {
        let mut model = DataModel::new();
        let anchor = InitAnchor::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap(), 0.0);
        let name = model.intern("Editor");
        model.register_participant(EndpointId(1), CaptureId(1), anchor, Some(name), false, true);

        let path = model.intern("/Game/Foo");
        let step = model.intern("Apply");
        let key = SequenceKey {
            protocol: ProtocolId(1),
            path,
            sequence: SequenceId(5),
        };
        model.open_scope(key, EndpointId(1), 2.0);
        model.begin_processing_step(key, EndpointId(1), 2.5, step);
        RwLock::new(model)
    }

    #[test]
    fn test_unbounded_ends_become_none() {
        let model = model();
        let query = ReplicationQuery::lock(&model);
        let report =
            ReplicationReport::build(&query, CaptureId(1), Vec::new(), AggregatorStats::default());

        assert_eq!(report.sequence_count(), 1);
        let sequence = &report.protocols[0].objects[0].sequences[0];
        assert_eq!(sequence.start, 2.0);
        assert_eq!(sequence.end, None);
        assert_eq!(sequence.state, SequenceState::Open);
        assert_eq!(sequence.scopes.len(), 1);
        assert_eq!(sequence.scopes[0].owner, ScopeOwner::Participant(EndpointId(1)));
        assert_eq!(sequence.scopes[0].end, None);
        assert_eq!(sequence.processing[0].steps[0].name.as_deref(), Some("Apply"));
    }

    #[test]
    fn test_json_output() {
        let model = model();
        let query = ReplicationQuery::lock(&model);
        let report =
            ReplicationReport::build(&query, CaptureId(1), Vec::new(), AggregatorStats::default());

        let json = report.to_json().unwrap();
        assert!(json.contains("\"format\": \"replitrace-json-v1\""));
        assert!(json.contains("\"/Game/Foo\""));

        let parsed: ReplicationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_text_output() {
        let model = model();
        let query = ReplicationQuery::lock(&model);
        let report =
            ReplicationReport::build(&query, CaptureId(1), Vec::new(), AggregatorStats::default());

        let text = report.to_text();
        assert!(text.contains("[1] Editor (capture 1) [main]"));
        assert!(text.contains("Protocol 1:"));
        assert!(text.contains("/Game/Foo"));
        assert!(text.contains("Apply"));
        assert!(text.contains("open"));
    }
}
