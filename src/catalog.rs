//! Capture catalogs
//!
//! A catalog lists the captures known to the trace store and opens their
//! byte streams. The aggregator receives its catalog by injection, so
//! discovery and workers run against an in-memory catalog in tests and
//! against a directory of capture files from the CLI.

use crate::error::{CaptureError, Result};
use crate::event_stream::{read_header, ByteStream};
use crate::messages::CaptureId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// File extension of captures picked up by [`DirectoryCatalog`]
pub const CAPTURE_EXTENSION: &str = "ndjson";

/// Catalog entry for one capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureInfo {
    pub id: CaptureId,
    pub created_at: DateTime<Utc>,
}

/// Read access to the set of known captures
pub trait CaptureCatalog: Send + Sync {
    fn capture_count(&self) -> usize;

    fn capture_info(&self, index: usize) -> Option<CaptureInfo>;

    fn capture_info_by_id(&self, id: CaptureId) -> Option<CaptureInfo>;

    fn open_byte_stream(&self, id: CaptureId) -> Result<ByteStream>;

    /// All entries in catalog order
    fn captures(&self) -> Vec<CaptureInfo> {
        (0..self.capture_count())
            .filter_map(|index| self.capture_info(index))
            .collect()
    }
}

/// Catalog over every `*.ndjson` capture file in a directory
///
/// # Example
///
/// ```no_run
/// use replitrace::catalog::{CaptureCatalog, DirectoryCatalog};
///
/// let catalog = DirectoryCatalog::open("./captures")?;
/// for info in catalog.captures() {
///     println!("{} created at {}", info.id, info.created_at);
/// }
/// # Ok::<(), replitrace::error::CaptureError>(())
/// ```
#[derive(Debug)]
pub struct DirectoryCatalog {
    entries: Vec<(CaptureInfo, PathBuf)>,
}

impl DirectoryCatalog {
    /// Index the capture headers found in `dir`
    ///
    /// Files whose header cannot be read are skipped with a warning. When two
    /// files declare the same capture id, the first in creation order wins.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let mut entries: Vec<(CaptureInfo, PathBuf)> = Vec::new();

        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CAPTURE_EXTENSION) {
                continue;
            }
            let mut reader = BufReader::new(File::open(&path)?);
            match read_header(&mut reader) {
                Ok(header) => entries.push((
                    CaptureInfo {
                        id: header.capture_id,
                        created_at: header.created_at,
                    },
                    path,
                )),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable capture"),
            }
        }

        entries.sort_by(|(a, _), (b, _)| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut deduped: Vec<(CaptureInfo, PathBuf)> = Vec::with_capacity(entries.len());
        for (info, path) in entries {
            if let Some((_, existing)) = deduped.iter().find(|(seen, _)| seen.id == info.id) {
                warn!(
                    capture = %info.id,
                    kept = %existing.display(),
                    skipped = %path.display(),
                    "Duplicate capture id in catalog directory"
                );
                continue;
            }
            deduped.push((info, path));
        }

        debug!(count = deduped.len(), "Indexed capture directory");
        Ok(Self { entries: deduped })
    }

    pub fn path_of(&self, id: CaptureId) -> Option<&Path> {
        self.entries
            .iter()
            .find(|(info, _)| info.id == id)
            .map(|(_, path)| path.as_path())
    }
}

impl CaptureCatalog for DirectoryCatalog {
    fn capture_count(&self) -> usize {
        self.entries.len()
    }

    fn capture_info(&self, index: usize) -> Option<CaptureInfo> {
        self.entries.get(index).map(|(info, _)| *info)
    }

    fn capture_info_by_id(&self, id: CaptureId) -> Option<CaptureInfo> {
        self.entries
            .iter()
            .find(|(info, _)| info.id == id)
            .map(|(info, _)| *info)
    }

    fn open_byte_stream(&self, id: CaptureId) -> Result<ByteStream> {
        let path = self.path_of(id).ok_or(CaptureError::UnknownCapture(id))?;
        Ok(Box::new(File::open(path)?))
    }
}

/// In-memory catalog of capture byte buffers
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    entries: Vec<(CaptureInfo, Arc<[u8]>)>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, info: CaptureInfo, bytes: impl Into<Arc<[u8]>>) {
        self.entries.retain(|(existing, _)| existing.id != info.id);
        self.entries.push((info, bytes.into()));
    }

    /// Register an NDJSON capture, taking its catalog entry from the header
    pub fn insert_ndjson(&mut self, capture: &str) -> Result<CaptureInfo> {
        let header = read_header(&mut capture.as_bytes())?;
        let info = CaptureInfo {
            id: header.capture_id,
            created_at: header.created_at,
        };
        self.insert(info, capture.as_bytes());
        Ok(info)
    }
}

impl CaptureCatalog for MemoryCatalog {
    fn capture_count(&self) -> usize {
        self.entries.len()
    }

    fn capture_info(&self, index: usize) -> Option<CaptureInfo> {
        self.entries.get(index).map(|(info, _)| *info)
    }

    fn capture_info_by_id(&self, id: CaptureId) -> Option<CaptureInfo> {
        self.entries
            .iter()
            .find(|(info, _)| info.id == id)
            .map(|(info, _)| *info)
    }

    fn open_byte_stream(&self, id: CaptureId) -> Result<ByteStream> {
        let bytes = self
            .entries
            .iter()
            .find(|(info, _)| info.id == id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or(CaptureError::UnknownCapture(id))?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}
