// Session participants
//
// A participant exists from its first Init onward; the Init anchor it carries
// is what makes its local timestamps convertible to global time.

use crate::messages::{CaptureId, EndpointId};
use crate::string_arena::Symbol;
use crate::time_sync::InitAnchor;

/// One process in the editing session
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: EndpointId,
    /// Display name, interned in the data model's arena
    pub name: Option<Symbol>,
    pub is_server: bool,
    pub anchor: InitAnchor,
    /// True for the participant whose timeline is the global axis
    pub is_main: bool,
    /// Capture the Init was decoded from
    pub capture: CaptureId,
}

impl Participant {
    /// Convert a local timestamp of this participant to the main participant's timeline
    pub fn to_global(&self, main: &InitAnchor, local_seconds: f64) -> f64 {
        self.anchor.convert_to(main, local_seconds)
    }
}

/// Result of registering an Init
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    /// Same endpoint already initialized from the same capture
    Duplicate,
    /// Same endpoint already initialized from a different capture
    Ambiguous { existing: CaptureId },
}
