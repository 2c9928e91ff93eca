//! Aggregator: folds every participant's messages into one global timeline
//!
//! # Design
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ FOREGROUND THREAD                                               │
//! │   main capture event → MessageDecoder → Ingestor (inline)       │
//! │   tick(): for each worker { drain queue → Ingestor }            │
//! │   Ingestor: local time → global time → DataModel (write lock)   │
//! └─────────────────────────────────────────────────────────────────┘
//!          ▲ queue              ▲ queue              ▲ queue
//! ┌────────┴───────┐   ┌────────┴───────┐   ┌────────┴───────┐
//! │ peer worker 1  │   │ peer worker 2  │   │ peer worker N  │
//! └────────────────┘   └────────────────┘   └────────────────┘
//! ```
//!
//! Peer workers are spawned once, when the main participant's Init is first
//! seen, for every capture discovery relates to the main one. Global time is
//! the main participant's local timeline; a message is only aggregated once
//! both its own participant's Init and the main Init are known.
//!
//! Ordering holds within one capture only. All scope state is keyed by
//! (sequence, participant), so interleaving across captures is harmless.

use crate::catalog::CaptureCatalog;
use crate::config::AnalysisConfig;
use crate::decoder::MessageDecoder;
use crate::discovery::select_related_captures;
use crate::error::Result;
use crate::event_stream::{EventDecoderFactory, TraceEvent};
use crate::messages::{
    CaptureId, EndpointId, InitMessage, MessageSink, ObjectEvent, ObjectRef, ProcessingBegin,
};
use crate::model::{DataModel, Registration, ScopeChange, SequenceKey};
use crate::query::ReplicationQuery;
use crate::string_arena::{SharedArena, Symbol};
use crate::time_sync::InitAnchor;
use crate::worker::{CaptureWorker, WorkerStats};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Externally owned collaborators, injected at construction
#[derive(Clone)]
pub struct AnalysisContext {
    pub catalog: Arc<dyn CaptureCatalog>,
    pub decoders: Arc<dyn EventDecoderFactory>,
}

impl AnalysisContext {
    pub fn new(catalog: Arc<dyn CaptureCatalog>, decoders: Arc<dyn EventDecoderFactory>) -> Self {
        Self { catalog, decoders }
    }
}

/// Counters of what the aggregator did with incoming messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorStats {
    pub aggregated: u64,
    pub dropped_missing_init: u64,
    pub duplicate_init: u64,
    pub ambiguous_identity: u64,
    pub duplicate_receive: u64,
    pub close_without_open: u64,
    pub duplicate_sink: u64,
    pub unmatched_step_end: u64,
}

/// Multi-capture replication aggregator
pub struct Aggregator {
    config: AnalysisConfig,
    context: AnalysisContext,
    main_capture: CaptureId,
    model: Arc<RwLock<DataModel>>,
    main_arena: SharedArena,
    main_decoder: MessageDecoder,
    discovery_ran: bool,
    stats: AggregatorStats,
    workers: Vec<CaptureWorker>,
}

impl Aggregator {
    pub fn new(config: AnalysisConfig, context: AnalysisContext, main_capture: CaptureId) -> Self {
        let main_arena = SharedArena::new();
        Self {
            config,
            context,
            main_capture,
            model: Arc::new(RwLock::new(DataModel::new())),
            main_decoder: MessageDecoder::new(main_arena.clone()),
            main_arena,
            discovery_ran: false,
            stats: AggregatorStats::default(),
            workers: Vec::new(),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn main_capture(&self) -> CaptureId {
        self.main_capture
    }

    pub fn stats(&self) -> &AggregatorStats {
        &self.stats
    }

    pub fn worker_stats(&self) -> Vec<WorkerStats> {
        self.workers.iter().map(CaptureWorker::stats).collect()
    }

    /// Captures currently being decoded in the background
    pub fn peer_captures(&self) -> Vec<CaptureId> {
        self.workers.iter().map(CaptureWorker::capture).collect()
    }

    /// Read-only view of the data model, excluding concurrent mutation while held
    pub fn query(&self) -> ReplicationQuery<'_> {
        ReplicationQuery::lock(&self.model)
    }

    /// Shared handle to the data model for readers on other threads
    pub fn shared_model(&self) -> Arc<RwLock<DataModel>> {
        self.model.clone()
    }

    /// Process one main-capture event inline
    pub fn on_main_event(&mut self, event: &TraceEvent, local_seconds: f64) {
        let mut main_registered = false;
        {
            let mut model = self.model.write().unwrap_or_else(PoisonError::into_inner);
            let mut ingestor = Ingestor {
                model: &mut *model,
                arena: &self.main_arena,
                capture: self.main_capture,
                is_main_capture: true,
                stats: &mut self.stats,
                main_registered: &mut main_registered,
            };
            self.main_decoder.decode(event, local_seconds, &mut ingestor);
        }
        if main_registered {
            self.discover_peers();
        }
    }

    /// Drain every peer worker's queue into the data model
    ///
    /// A no-op returning 0 unless `drain_peer_captures` is enabled.
    pub fn tick(&mut self) -> usize {
        if !self.config.drain_peer_captures || self.workers.is_empty() {
            return 0;
        }

        let mut model = self.model.write().unwrap_or_else(PoisonError::into_inner);
        let mut drained = 0;
        for worker in &mut self.workers {
            let arena = worker.arena().clone();
            // Peer captures never designate the main participant
            let mut ignored = false;
            let mut ingestor = Ingestor {
                model: &mut *model,
                arena: &arena,
                capture: worker.capture(),
                is_main_capture: false,
                stats: &mut self.stats,
                main_registered: &mut ignored,
            };
            drained += worker.drain(|message| message.dispatch(&mut ingestor));
        }
        if drained > 0 {
            debug!(drained, "Aggregated peer messages");
        }
        drained
    }

    /// Decode the whole main capture inline, ticking every `tick_interval_events`
    pub fn run_main_capture(&mut self) -> Result<u64> {
        let stream = self
            .context
            .catalog
            .open_byte_stream(self.main_capture)?;
        let mut events = self.context.decoders.open(stream)?;

        let interval = self.config.tick_interval_events.max(1) as u64;
        let mut processed = 0u64;
        while let Some(event) = events.next_event()? {
            let local_seconds = events.cycles_to_seconds(event.cycle);
            self.on_main_event(&event, local_seconds);
            processed += 1;
            if processed % interval == 0 {
                self.tick();
            }
        }
        self.tick();
        info!(capture = %self.main_capture, events = processed, "Main capture processed");
        Ok(processed)
    }

    /// Tick until every peer worker has finished and its queue is empty
    ///
    /// Returns immediately when draining is disabled.
    pub fn settle(&mut self) {
        const POLL_MS: u64 = 2;

        if !self.config.drain_peer_captures {
            return;
        }
        while self.workers.iter().any(|worker| !worker.is_finished()) {
            self.tick();
            thread::sleep(Duration::from_millis(POLL_MS));
        }
        self.tick();
    }

    /// Stop and join every peer worker, discarding undrained messages
    pub fn stop(&mut self) {
        for worker in &mut self.workers {
            worker.stop();
        }
        self.workers.clear();
    }

    fn discover_peers(&mut self) {
        if self.discovery_ran {
            return;
        }
        self.discovery_ran = true;

        let related = select_related_captures(
            self.context.catalog.as_ref(),
            self.main_capture,
            self.config.discovery_tolerance_secs,
        );
        for info in related {
            match CaptureWorker::spawn(
                info.id,
                self.context.catalog.as_ref(),
                self.context.decoders.as_ref(),
            ) {
                Ok(worker) => self.workers.push(worker),
                Err(e) => warn!(capture = %info.id, error = %e, "Failed to start capture worker"),
            }
        }
        info!(
            peers = self.workers.len(),
            draining = self.config.drain_peer_captures,
            "Peer captures discovered"
        );
    }
}

impl Drop for Aggregator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Applies decoded messages from one capture to the data model
struct Ingestor<'a> {
    model: &'a mut DataModel,
    arena: &'a SharedArena,
    capture: CaptureId,
    is_main_capture: bool,
    stats: &'a mut AggregatorStats,
    main_registered: &'a mut bool,
}

impl Ingestor<'_> {
    /// Global time of `local_seconds` on `endpoint`'s timeline, if both anchors are known
    fn global_time(&mut self, endpoint: EndpointId, local_seconds: f64) -> Option<f64> {
        let global = self.model.main_participant().and_then(|main| {
            self.model
                .participant(endpoint)
                .map(|source| source.to_global(&main.anchor, local_seconds))
        });
        if global.is_none() {
            self.stats.dropped_missing_init += 1;
            warn!(
                capture = %self.capture,
                endpoint = %endpoint,
                "Event before Init of its participant or of the main participant, dropped"
            );
        }
        global
    }

    fn copy_symbol(&mut self, symbol: Symbol) -> Option<Symbol> {
        let copied = self.arena.copy_into(symbol, self.model.strings_mut());
        if copied.is_none() {
            warn!(capture = %self.capture, "Message references an unknown string, dropped");
        }
        copied
    }

    /// Resolve an object event to its model key and global time
    fn resolve(&mut self, event: &ObjectEvent) -> Option<(SequenceKey, f64)> {
        let at = self.global_time(event.endpoint, event.local_seconds)?;
        let ObjectRef {
            protocol,
            object_path,
            sequence,
        } = event.object;
        let path = self.copy_symbol(object_path)?;
        self.stats.aggregated += 1;
        Some((
            SequenceKey {
                protocol,
                path,
                sequence,
            },
            at,
        ))
    }
}

impl MessageSink for Ingestor<'_> {
    fn on_init(&mut self, message: InitMessage) {
        let is_main = self.is_main_capture && self.model.main_participant().is_none();
        let anchor = InitAnchor::new(message.wall_clock, message.local_seconds);

        match self.model.register_participant(
            message.endpoint,
            self.capture,
            anchor,
            None,
            message.is_server,
            is_main,
        ) {
            Registration::Created => {
                self.stats.aggregated += 1;
                // Only accepted Inits copy their name into the model arena
                if let Some(name) = message.name.and_then(|symbol| self.copy_symbol(symbol)) {
                    self.model.set_participant_name(message.endpoint, name);
                }
                debug!(
                    capture = %self.capture,
                    endpoint = %message.endpoint,
                    main = is_main,
                    "Participant initialized"
                );
                if is_main {
                    *self.main_registered = true;
                }
            }
            Registration::Duplicate => {
                self.stats.duplicate_init += 1;
                warn!(
                    endpoint = %message.endpoint,
                    capture = %self.capture,
                    "Duplicate Init ignored"
                );
            }
            Registration::Ambiguous { existing } => {
                self.stats.ambiguous_identity += 1;
                warn!(
                    endpoint = %message.endpoint,
                    capture = %self.capture,
                    existing_capture = %existing,
                    "Endpoint id already initialized by another capture, ignoring"
                );
            }
        }
    }

    fn on_processing_begin(&mut self, message: ProcessingBegin) {
        let Some((key, at)) = self.resolve(&message.event) else {
            return;
        };
        let Some(name) = self.copy_symbol(message.step_name) else {
            return;
        };
        self.model
            .begin_processing_step(key, message.event.endpoint, at, name);
    }

    fn on_processing_end(&mut self, message: ObjectEvent) {
        let Some((key, at)) = self.resolve(&message) else {
            return;
        };
        if !self.model.end_processing_step(key, message.endpoint, at) {
            self.stats.unmatched_step_end += 1;
            debug!(
                endpoint = %message.endpoint,
                sequence = %key.sequence,
                "Processing end without open step"
            );
        }
    }

    fn on_transmission_start(&mut self, message: ObjectEvent) {
        let Some((key, at)) = self.resolve(&message) else {
            return;
        };
        if self.model.close_scope(key, message.endpoint, at) == ScopeChange::NotOpen {
            self.stats.close_without_open += 1;
            warn!(
                endpoint = %message.endpoint,
                sequence = %key.sequence,
                "Close requested with no open scope, ignored"
            );
        }
    }

    fn on_transmission_receive(&mut self, message: ObjectEvent) {
        let Some((key, at)) = self.resolve(&message) else {
            return;
        };
        match self.model.open_scope(key, message.endpoint, at) {
            ScopeChange::AlreadyOpen => {
                self.stats.duplicate_receive += 1;
                warn!(
                    endpoint = %message.endpoint,
                    sequence = %key.sequence,
                    "Receive while a scope is already open, ignored"
                );
            }
            ScopeChange::AlreadySunk => {
                debug!(
                    endpoint = %message.endpoint,
                    sequence = %key.sequence,
                    "Receive after sink ignored"
                );
            }
            _ => {}
        }
    }

    fn on_sink(&mut self, message: ObjectEvent) {
        let Some((key, at)) = self.resolve(&message) else {
            return;
        };
        if !self.model.sink_sequence(key, message.endpoint, at) {
            self.stats.duplicate_sink += 1;
            warn!(
                endpoint = %message.endpoint,
                sequence = %key.sequence,
                "Duplicate sink ignored"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::decoder::fields;
    use crate::event_stream::{ByteStream, EventStream, NdjsonDecoder};
    use crate::messages::{ProtocolId, SequenceId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const T_SECS: i64 = 1_714_564_800;

    fn context(catalog: MemoryCatalog) -> AnalysisContext {
        AnalysisContext::new(Arc::new(catalog), Arc::new(NdjsonDecoder))
    }

    fn init(endpoint: u64, wall_offset_secs: i64) -> TraceEvent {
        TraceEvent::new("Init", 0)
            .with_field(fields::ENDPOINT_ID, endpoint)
            .with_field(fields::WALL_CLOCK, (T_SECS + wall_offset_secs) * 1_000_000)
    }

    fn object(route: &str, endpoint: u64, sequence: u64) -> TraceEvent {
        TraceEvent::new(route, 0)
            .with_field(fields::ENDPOINT_ID, endpoint)
            .with_field(fields::PROTOCOL_ID, 1u64)
            .with_field(fields::SEQUENCE_ID, sequence)
            .with_field(fields::OBJECT_PATH, "/Game/Foo")
    }

    fn main_only() -> Aggregator {
        let mut catalog = MemoryCatalog::new();
        catalog
            .insert_ndjson(r#"{"capture_id":1,"created_at":"2024-05-01T12:00:01Z","cycle_frequency":1000}"#)
            .unwrap();
        Aggregator::new(AnalysisConfig::default(), context(catalog), CaptureId(1))
    }

    #[test]
    fn test_events_before_main_init_are_dropped() {
        let mut aggregator = main_only();
        aggregator.on_main_event(&object("ObjectProcessingBegin", 1, 5), 0.5);
        assert_eq!(aggregator.stats().dropped_missing_init, 1);
        assert!(aggregator.query().protocols().is_empty());
    }

    #[test]
    fn test_main_messages_use_identity_time() {
        let mut aggregator = main_only();
        aggregator.on_main_event(&init(1, 1), 1.0);
        aggregator.on_main_event(&object("ObjectProcessingBegin", 1, 5), 3.0);
        aggregator.on_main_event(&object("ObjectProcessingEnd", 1, 5), 4.0);

        let query = aggregator.query();
        let track = query.object_track(ProtocolId(1), "/Game/Foo").unwrap();
        let sequence = track.sequence(SequenceId(5)).unwrap();
        assert_eq!(sequence.bounds(), (3.0, f64::INFINITY));
        assert_eq!(query.main_endpoint(), Some(EndpointId(1)));
    }

    #[test]
    fn test_duplicate_init_is_counted() {
        let mut aggregator = main_only();
        aggregator.on_main_event(&init(1, 1), 1.0);
        aggregator.on_main_event(&init(1, 1), 1.0);
        assert_eq!(aggregator.stats().duplicate_init, 1);
    }

    #[test]
    fn test_rejected_init_name_is_not_interned() {
        let mut aggregator = main_only();
        aggregator.on_main_event(&init(1, 1).with_field(fields::NAME, "Server"), 1.0);
        aggregator.on_main_event(&init(1, 1).with_field(fields::NAME, "Impostor"), 1.0);

        assert_eq!(aggregator.stats().duplicate_init, 1);
        let query = aggregator.query();
        assert_eq!(query.participant_name(EndpointId(1)), "Server");
        assert!(query.model().lookup("Server").is_some());
        assert!(query.model().lookup("Impostor").is_none());
    }

    #[test]
    fn test_duplicate_receive_and_lonely_close_are_absorbed() {
        let mut aggregator = main_only();
        aggregator.on_main_event(&init(1, 1), 1.0);
        aggregator.on_main_event(&object("ObjectTransmissionStart", 1, 5), 2.0);
        aggregator.on_main_event(&object("ObjectTransmissionReceive", 1, 5), 3.0);
        aggregator.on_main_event(&object("ObjectTransmissionReceive", 1, 5), 3.5);
        aggregator.on_main_event(&object("ObjectSink", 1, 5), 4.0);
        aggregator.on_main_event(&object("ObjectSink", 1, 5), 4.5);

        let stats = aggregator.stats();
        assert_eq!(stats.close_without_open, 1);
        assert_eq!(stats.duplicate_receive, 1);
        assert_eq!(stats.duplicate_sink, 1);

        let query = aggregator.query();
        let track = query.object_track(ProtocolId(1), "/Game/Foo").unwrap();
        let sequence = track.sequence(SequenceId(5)).unwrap();
        assert_eq!(sequence.bounds(), (2.0, 4.0));
    }

    struct PanickingStream;

    impl EventStream for PanickingStream {
        fn next_event(&mut self) -> Result<Option<TraceEvent>> {
            panic!("corrupt capture");
        }

        fn cycles_to_seconds(&self, cycle: u64) -> f64 {
            cycle as f64
        }
    }

    /// Decodes the first capture opened (the main one) and panics on every other
    #[derive(Default)]
    struct PanickingPeers {
        opened: AtomicUsize,
    }

    impl EventDecoderFactory for PanickingPeers {
        fn open(&self, stream: ByteStream) -> Result<Box<dyn EventStream>> {
            if self.opened.fetch_add(1, Ordering::SeqCst) == 0 {
                NdjsonDecoder.open(stream)
            } else {
                Ok(Box::new(PanickingStream))
            }
        }
    }

    #[test]
    fn test_settle_returns_when_peer_worker_panics() {
        let mut catalog = MemoryCatalog::new();
        catalog
            .insert_ndjson(concat!(
                r#"{"capture_id":1,"created_at":"2024-05-01T12:00:01Z","cycle_frequency":1000}"#,
                "\n",
                r#"{"route":"Init","cycle":1000,"fields":{"EndpointId":1,"WallClock":1714564801000000}}"#,
                "\n",
            ))
            .unwrap();
        catalog
            .insert_ndjson(concat!(
                r#"{"capture_id":2,"created_at":"2024-05-01T12:00:03Z","cycle_frequency":1000}"#,
                "\n",
            ))
            .unwrap();
        let config = AnalysisConfig {
            drain_peer_captures: true,
            ..AnalysisConfig::default()
        };
        let context = AnalysisContext::new(Arc::new(catalog), Arc::new(PanickingPeers::default()));
        let mut aggregator = Aggregator::new(config, context, CaptureId(1));

        aggregator.run_main_capture().unwrap();
        assert_eq!(aggregator.peer_captures(), vec![CaptureId(2)]);
        aggregator.settle();

        assert!(aggregator.worker_stats()[0].finished);
        assert_eq!(aggregator.query().main_endpoint(), Some(EndpointId(1)));
    }

    #[test]
    fn test_tick_is_noop_when_draining_disabled() {
        let mut aggregator = main_only();
        assert_eq!(aggregator.tick(), 0);
        assert!(aggregator.peer_captures().is_empty());
    }
}
