//! Ordered single-producer/single-consumer message queue
//!
//! Each capture worker owns one queue. The background decode thread holds the
//! [`QueueProducer`] and the aggregator's foreground thread holds the
//! [`QueueConsumer`]; neither half is `Clone`, so the single-producer and
//! single-consumer discipline is enforced by ownership.
//!
//! # Design
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ DECODE THREAD (per peer capture)                                │
//! │   event_stream.next_event() → decoder.decode() → producer.push()│
//! │   Blocks only on its own input stream                           │
//! └─────────────────────────────────────────────────────────────────┘
//!                          │
//!                          │ Lock-free SegQueue (unbounded, FIFO)
//!                          ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ FOREGROUND THREAD (aggregator tick)                             │
//! │   while let Some(msg) = consumer.pop() { aggregate(msg) }       │
//! │   Non-blocking poll                                             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Unlike a span ring buffer, nothing is ever dropped for back-pressure: the
//! queue is unbounded, and every pushed message is popped exactly once in
//! push order.

use crate::messages::{InitMessage, Message, MessageSink, ObjectEvent, ProcessingBegin};
use crossbeam::queue::SegQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct Shared {
    queue: SegQueue<Message>,
    total_pushed: AtomicU64,
    total_popped: AtomicU64,
}

/// Create a connected producer/consumer pair
///
/// # Example
///
/// ```
/// use replitrace::message_queue;
/// use replitrace::messages::{EndpointId, InitMessage, Message};
/// use chrono::Utc;
///
/// let (mut producer, mut consumer) = message_queue::channel();
/// let init = InitMessage {
///     endpoint: EndpointId(1),
///     wall_clock: Utc::now(),
///     local_seconds: 0.0,
///     name: None,
///     is_server: false,
/// };
/// producer.push(Message::Init(init));
///
/// assert_eq!(consumer.pop(), Some(Message::Init(init)));
/// assert_eq!(consumer.pop(), None);
/// ```
pub fn channel() -> (QueueProducer, QueueConsumer) {
    let shared = Arc::new(Shared {
        queue: SegQueue::new(),
        total_pushed: AtomicU64::new(0),
        total_popped: AtomicU64::new(0),
    });
    (
        QueueProducer {
            shared: shared.clone(),
        },
        QueueConsumer { shared },
    )
}

/// Producing half, owned by the decode thread
pub struct QueueProducer {
    shared: Arc<Shared>,
}

impl QueueProducer {
    /// Enqueue a message (never blocks, never drops)
    pub fn push(&mut self, message: Message) {
        self.shared.queue.push(message);
        self.shared.total_pushed.fetch_add(1, Ordering::Release);
    }
}

impl MessageSink for QueueProducer {
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

/// Consuming half, owned by the aggregator
pub struct QueueConsumer {
    shared: Arc<Shared>,
}

impl QueueConsumer {
    /// Dequeue the oldest message, if any (non-blocking)
    pub fn pop(&mut self) -> Option<Message> {
        let message = self.shared.queue.pop()?;
        self.shared.total_popped.fetch_add(1, Ordering::Relaxed);
        Some(message)
    }

    /// Pop every message currently queued, in FIFO order
    ///
    /// Messages pushed while draining are picked up as well; returns the
    /// number of messages handed to `handle`.
    pub fn drain<F: FnMut(Message)>(&mut self, mut handle: F) -> usize {
        let mut drained = 0;
        while let Some(message) = self.pop() {
            handle(message);
            drained += 1;
        }
        drained
    }

    /// Discard all pending messages
    pub fn clear(&mut self) -> usize {
        self.drain(|_| {})
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            total_pushed: self.shared.total_pushed.load(Ordering::Acquire),
            total_popped: self.shared.total_popped.load(Ordering::Relaxed),
            pending: self.shared.queue.len(),
        }
    }

    /// True when the producer half has been dropped
    pub fn is_disconnected(&self) -> bool {
        Arc::strong_count(&self.shared) == 1
    }
}

/// Queue statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_pushed: u64,
    pub total_popped: u64,
    pub pending: usize,
}

impl QueueStats {
    /// Fraction of pushed messages already consumed (0.0 to 1.0)
    pub fn drain_ratio(&self) -> f64 {
        if self.total_pushed == 0 {
            1.0
        } else {
            self.total_popped as f64 / self.total_pushed as f64
        }
    }
}
