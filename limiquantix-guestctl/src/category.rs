//! Event categories used for fan-out signaling.

use serde::{Deserialize, Serialize};

/// A tag under which several waiters can be signaled together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    SessionStateChanged,
    ProcessStateChanged,
    ProcessInputNotify,
    ProcessOutput,
    FileStateChanged,
    FileOffsetChanged,
    FileRead,
    FileWrite,
    ProgressUpdate,
    /// Category defined by a higher layer.
    Custom(u32),
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::SessionStateChanged => write!(f, "session_state_changed"),
            EventCategory::ProcessStateChanged => write!(f, "process_state_changed"),
            EventCategory::ProcessInputNotify => write!(f, "process_input_notify"),
            EventCategory::ProcessOutput => write!(f, "process_output"),
            EventCategory::FileStateChanged => write!(f, "file_state_changed"),
            EventCategory::FileOffsetChanged => write!(f, "file_offset_changed"),
            EventCategory::FileRead => write!(f, "file_read"),
            EventCategory::FileWrite => write!(f, "file_write"),
            EventCategory::ProgressUpdate => write!(f, "progress_update"),
            EventCategory::Custom(id) => write!(f, "custom:{}", id),
        }
    }
}
