//! Error types for the guest control layer.

use thiserror::Error;

/// Errors returned by context generation, wait events, the event registry
/// and the stream reassembler.
///
/// Nothing in this crate panics on these conditions; every failure is
/// returned to the caller, who decides whether to retry, give up or
/// escalate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuestCtlError {
    /// Malformed input (codec bounds, empty key, empty feed).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Lookup miss: context id, category or protocol key.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Allocation failed. State is left unchanged.
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// Wait exceeded its deadline.
    #[error("Wait timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The event (or the whole registry) was cancelled.
    #[error("Wait event was cancelled")]
    Cancelled,

    /// `cancel()` was called on an event that is already cancelled.
    #[error("Wait event is already cancelled")]
    AlreadyCancelled,

    /// A second signal (or a cancel) hit an event that already completed.
    #[error("Wait event was already signaled")]
    AlreadySignaled,

    /// A stream record can never be completed by more bytes.
    #[error("Malformed guest stream: {0}")]
    ProtocolMalformed(String),

    /// Every sequence value for a session/object pair is still registered.
    #[error("No free context id for session {session_id}, object {object_id}")]
    ContextIdsExhausted { session_id: u32, object_id: u32 },

    /// The transport delivered a callback this layer does not handle.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// The guest reported a failure code.
    #[error("Guest returned error code {code}")]
    GuestError { code: i32 },

    /// Sending a command to the guest failed.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl GuestCtlError {
    /// Whether the operation may succeed if simply attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GuestCtlError::Timeout { .. })
    }

    /// Whether this error is the expected result of a shutdown.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GuestCtlError::Cancelled | GuestCtlError::AlreadyCancelled)
    }
}

/// Result type alias for guest control operations.
pub type Result<T> = std::result::Result<T, GuestCtlError>;
