//! Replitrace - multi-process replication trace aggregator
//!
//! Several processes of one editing session each record their own trace
//! capture on their own local clock. This library decodes those captures,
//! reconciles every participant's timeline onto the main participant's via
//! the wall-clock anchors recorded at Init, and folds the replication
//! messages into a data model of object tracks, sequences, network scopes
//! and nested processing steps, served through a read-only query surface.
//!
//! ```text
//! catalog ──► discovery ──► worker (thread) ──► message_queue ─┐
//!    │                                                          ▼
//!    └──► event_stream ──► decoder ──────────────────────► aggregator ──► model ──► query / report
//! ```

pub mod aggregator;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod discovery;
pub mod error;
pub mod event_stream;
pub mod message_queue;
pub mod messages;
pub mod model;
pub mod query;
pub mod report;
pub mod string_arena;
pub mod time_sync;
pub mod worker;
