//! Context id generation.
//!
//! Every request sent to the guest agent carries a 32-bit context id so the
//! reply can be routed back to the waiter that issued it:
//!
//! ```text
//! ┌──────────────┬───────────────────┬──────────────────────────┐
//! │ 31 ...... 27 │ 26 ........... 16 │ 15 ..................  0 │
//! │  session (5) │    object (11)    │      sequence (16)       │
//! └──────────────┴───────────────────┴──────────────────────────┘
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::{GuestCtlError, Result};

/// Number of guest sessions addressable by a context id.
pub const MAX_SESSIONS: u32 = 32;

/// Number of objects (processes, files) per session addressable by a context id.
pub const MAX_OBJECTS: u32 = 2048;

/// Modulus of the sequence counter.
pub const MAX_CONTEXTS: u32 = 65536;

const OBJECT_SHIFT: u32 = 16;
const SESSION_SHIFT: u32 = 27;

/// Opaque correlation tag embedded in every request/reply pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u32);

impl ContextId {
    /// Pack the three fields into one id.
    ///
    /// The sequence is truncated to its 16-bit field; session and object
    /// ids out of range are rejected.
    pub fn encode(session_id: u32, object_id: u32, sequence: u32) -> Result<Self> {
        check_bounds(session_id, object_id)?;
        Ok(Self(
            (session_id << SESSION_SHIFT)
                | (object_id << OBJECT_SHIFT)
                | (sequence & (MAX_CONTEXTS - 1)),
        ))
    }

    /// Wrap a raw id received from the transport.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub const fn session_id(self) -> u32 {
        self.0 >> SESSION_SHIFT
    }

    pub const fn object_id(self) -> u32 {
        (self.0 >> OBJECT_SHIFT) & (MAX_OBJECTS - 1)
    }

    pub const fn sequence(self) -> u32 {
        self.0 & (MAX_CONTEXTS - 1)
    }

    /// Unpack into `(session_id, object_id, sequence)`.
    pub const fn decode(self) -> (u32, u32, u32) {
        (self.session_id(), self.object_id(), self.sequence())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ContextId> for u32 {
    fn from(id: ContextId) -> Self {
        id.0
    }
}

fn check_bounds(session_id: u32, object_id: u32) -> Result<()> {
    if session_id >= MAX_SESSIONS {
        return Err(GuestCtlError::InvalidArgument(format!(
            "session id {} out of range (max {})",
            session_id,
            MAX_SESSIONS - 1
        )));
    }
    if object_id >= MAX_OBJECTS {
        return Err(GuestCtlError::InvalidArgument(format!(
            "object id {} out of range (max {})",
            object_id,
            MAX_OBJECTS - 1
        )));
    }
    Ok(())
}

static PROCESS_COUNTER: Lazy<Arc<SequenceCounter>> = Lazy::new(|| Arc::new(SequenceCounter::new()));

/// Atomic sequence source for context ids.
///
/// Registries share a counter through an `Arc`. Tests construct their own
/// so they never observe each other's sequence numbers.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    next: AtomicU32,
}

impl SequenceCounter {
    /// Create a counter whose first sequence is 0.
    pub const fn new() -> Self {
        Self {
            next: AtomicU32::new(0),
        }
    }

    /// Create a counter whose first sequence is `value` (modulo the counter range).
    pub fn starting_at(value: u32) -> Self {
        Self {
            next: AtomicU32::new(value % MAX_CONTEXTS),
        }
    }

    /// The counter shared by every registry built with `EventRegistry::new()`.
    pub fn process_wide() -> Arc<SequenceCounter> {
        Arc::clone(&PROCESS_COUNTER)
    }

    /// Return the next sequence number, wrapping to 0 at [`MAX_CONTEXTS`].
    pub fn next_sequence(&self) -> u32 {
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(if current + 1 >= MAX_CONTEXTS { 0 } else { current + 1 })
            })
            .unwrap_or_else(|current| current)
    }

    /// Mint a fresh context id for the given session and object.
    ///
    /// Bounds are checked before the counter advances.
    pub fn generate(&self, session_id: u32, object_id: u32) -> Result<ContextId> {
        check_bounds(session_id, object_id)?;
        ContextId::encode(session_id, object_id, self.next_sequence())
    }
}
