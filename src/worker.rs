//! Background capture workers
//!
//! One worker exists per discovered peer capture. It owns a dedicated decode
//! thread, that thread's [`MessageDecoder`], the consuming half of the
//! capture's [`message_queue`](crate::message_queue), and the capture's
//! string arena. The aggregator drains the queue from its foreground thread.
//!
//! Stopping a worker (explicitly or on drop) signals the thread, joins it,
//! and only then releases the queue and arena. Messages still queued at that
//! point are discarded.

use crate::catalog::CaptureCatalog;
use crate::decoder::{DecoderStats, MessageDecoder};
use crate::error::Result;
use crate::event_stream::{EventDecoderFactory, EventStream};
use crate::message_queue::{self, QueueConsumer, QueueProducer, QueueStats};
use crate::messages::{CaptureId, Message};
use crate::string_arena::SharedArena;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Snapshot of a worker's progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub capture: CaptureId,
    pub queue: QueueStats,
    /// True once the decode thread exited (end of stream, error or panic)
    pub finished: bool,
}

/// Raises the finished flag when the decode thread exits, including by panic
struct FinishedGuard(Arc<AtomicBool>);

impl Drop for FinishedGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Decode thread plus queue and arena for one peer capture
pub struct CaptureWorker {
    capture: CaptureId,
    arena: SharedArena,
    consumer: QueueConsumer,
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    handle: Option<JoinHandle<DecoderStats>>,
}

impl CaptureWorker {
    /// Open `capture` through the catalog and start decoding it in the background
    pub fn spawn(
        capture: CaptureId,
        catalog: &dyn CaptureCatalog,
        decoders: &dyn EventDecoderFactory,
    ) -> Result<Self> {
        let stream = decoders.open(catalog.open_byte_stream(capture)?)?;
        Self::spawn_stream(capture, stream)
    }

    /// Start decoding an already-opened event stream in the background
    pub fn spawn_stream(capture: CaptureId, stream: Box<dyn EventStream>) -> Result<Self> {
        let arena = SharedArena::new();
        let (producer, consumer) = message_queue::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let decoder = MessageDecoder::new(arena.clone());
        let thread_stop = stop.clone();
        let thread_finished = finished.clone();
        let handle = thread::Builder::new()
            .name(format!("capture-{}", capture))
            .spawn(move || {
                let _finished = FinishedGuard(thread_finished);
                Self::decode_worker(capture, stream, decoder, producer, &thread_stop)
            })?;

        debug!(capture = %capture, "Capture worker started");
        Ok(Self {
            capture,
            arena,
            consumer,
            stop,
            finished,
            handle: Some(handle),
        })
    }

    /// Decode loop run on the worker thread
    fn decode_worker(
        capture: CaptureId,
        mut stream: Box<dyn EventStream>,
        mut decoder: MessageDecoder,
        mut producer: QueueProducer,
        stop: &AtomicBool,
    ) -> DecoderStats {
        while !stop.load(Ordering::Acquire) {
            match stream.next_event() {
                Ok(Some(event)) => {
                    let local_seconds = stream.cycles_to_seconds(event.cycle);
                    decoder.decode(&event, local_seconds, &mut producer);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(capture = %capture, error = %e, "Capture decode failed, worker stopping");
                    break;
                }
            }
        }
        decoder.stats().clone()
    }

    pub fn capture(&self) -> CaptureId {
        self.capture
    }

    /// Arena holding the strings referenced by this worker's messages
    pub fn arena(&self) -> &SharedArena {
        &self.arena
    }

    /// Hand every queued message to `handle` in FIFO order (non-blocking)
    pub fn drain<F: FnMut(Message)>(&mut self, handle: F) -> usize {
        self.consumer.drain(handle)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            capture: self.capture,
            queue: self.consumer.stats(),
            finished: self.is_finished(),
        }
    }

    /// Stop and join the decode thread, discarding any queued messages
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(stats) => debug!(
                    capture = %self.capture,
                    decoded = stats.decoded,
                    unknown_route = stats.unknown_route,
                    malformed = stats.malformed,
                    "Capture worker joined"
                ),
                Err(_) => warn!(capture = %self.capture, "Capture worker thread panicked"),
            }
            let discarded = self.consumer.clear();
            if discarded > 0 {
                debug!(capture = %self.capture, discarded, "Dropped undrained messages");
            }
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::event_stream::NdjsonDecoder;
    use crate::messages::MessageKind;
    use std::time::{Duration, Instant};

    const PEER: &str = r#"{"capture_id":2,"created_at":"2024-05-01T12:00:03Z","cycle_frequency":1000}
{"route":"Init","cycle":2000,"fields":{"EndpointId":2,"WallClock":1714564803000000}}
{"route":"ObjectProcessingBegin","cycle":6000,"fields":{"EndpointId":2,"ProtocolId":1,"SequenceId":5,"ObjectPath":"/Game/Foo","StepName":"Apply"}}
{"route":"ObjectProcessingEnd","cycle":6500,"fields":{"EndpointId":2,"ProtocolId":1,"SequenceId":5,"ObjectPath":"/Game/Foo"}}
"#;

    fn wait_until_finished(worker: &CaptureWorker) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !worker.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(worker.is_finished(), "worker did not finish in time");
    }

    #[test]
    fn test_worker_decodes_whole_capture_in_order() {
        let mut catalog = MemoryCatalog::new();
        let info = catalog.insert_ndjson(PEER).unwrap();

        let mut worker = CaptureWorker::spawn(info.id, &catalog, &NdjsonDecoder).unwrap();
        wait_until_finished(&worker);

        let mut kinds = Vec::new();
        let drained = worker.drain(|message| kinds.push(message.kind()));
        assert_eq!(drained, 3);
        assert_eq!(
            kinds,
            vec![
                MessageKind::Init,
                MessageKind::ObjectProcessingBegin,
                MessageKind::ObjectProcessingEnd
            ]
        );
        assert_eq!(worker.stats().queue.total_popped, 3);
    }

    #[test]
    fn test_worker_arena_resolves_message_strings() {
        let mut catalog = MemoryCatalog::new();
        let info = catalog.insert_ndjson(PEER).unwrap();
        let mut worker = CaptureWorker::spawn(info.id, &catalog, &NdjsonDecoder).unwrap();
        wait_until_finished(&worker);

        let mut paths = Vec::new();
        let arena = worker.arena().clone();
        worker.drain(|message| {
            if let Message::ObjectProcessingBegin(begin) = message {
                paths.push(arena.resolve_owned(begin.event.object.object_path));
            }
        });
        assert_eq!(paths, vec![Some("/Game/Foo".to_string())]);
    }

    #[test]
    fn test_spawn_unknown_capture_fails() {
        let catalog = MemoryCatalog::new();
        assert!(CaptureWorker::spawn(CaptureId(42), &catalog, &NdjsonDecoder).is_err());
    }

    struct PanickingStream;

    impl EventStream for PanickingStream {
        fn next_event(&mut self) -> Result<Option<crate::event_stream::TraceEvent>> {
            panic!("corrupt capture");
        }

        fn cycles_to_seconds(&self, cycle: u64) -> f64 {
            cycle as f64
        }
    }

    #[test]
    fn test_panicking_stream_still_finishes() {
        let mut worker =
            CaptureWorker::spawn_stream(CaptureId(9), Box::new(PanickingStream)).unwrap();
        wait_until_finished(&worker);
        assert!(worker.stats().finished);
        assert_eq!(worker.drain(|_| {}), 0);
        // Joining a panicked thread is logged, not propagated
        worker.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut catalog = MemoryCatalog::new();
        let info = catalog.insert_ndjson(PEER).unwrap();
        let mut worker = CaptureWorker::spawn(info.id, &catalog, &NdjsonDecoder).unwrap();
        worker.stop();
        worker.stop();
        assert_eq!(worker.stats().queue.pending, 0);
    }
}
