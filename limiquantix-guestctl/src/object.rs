//! Guest-side objects (sessions, processes, files) as seen from the host.
//!
//! A [`GuestObject`] pairs a session/object id with the registry and the
//! transport. [`GuestObject::call`] runs one request/response exchange:
//!
//! ```text
//!   register wait ──> send command ──> wait (blocking thread) ──> unregister
//!        │                 │ fail                                     ▲
//!        │                 └──────────────────────────────────────────┘
//!        └─ context id travels with the command, the reply is
//!           dispatched back to the same id
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::category::EventCategory;
use crate::context::ContextId;
use crate::error::{GuestCtlError, Result};
use crate::registry::EventRegistry;
use crate::transport::{HostParam, Transport};
use crate::wait_event::{WaitEvent, WaitOutcome};

/// A session-scoped guest object that can send commands and await replies.
pub struct GuestObject {
    session_id: u32,
    object_id: u32,
    registry: Arc<EventRegistry>,
    transport: Arc<dyn Transport>,
}

impl GuestObject {
    /// Bind a guest object. Fails if either id is out of range.
    pub fn new(
        session_id: u32,
        object_id: u32,
        registry: Arc<EventRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        ContextId::encode(session_id, object_id, 0)?;
        Ok(Self {
            session_id,
            object_id,
            registry,
            transport,
        })
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn object_id(&self) -> u32 {
        self.object_id
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Register a wait event for this object.
    pub fn register_wait(&self, categories: &[EventCategory]) -> Result<(ContextId, Arc<WaitEvent>)> {
        self.registry.register(self.session_id, self.object_id, categories)
    }

    pub async fn send_command(&self, context_id: ContextId, opcode: u32, params: &[HostParam]) -> Result<()> {
        debug!(context_id = %context_id, opcode, "Sending guest command");
        self.transport.send_command(context_id, opcode, params).await
    }

    /// Block on `event` from a blocking thread and return its outcome.
    ///
    /// A zero `timeout` waits indefinitely.
    pub async fn wait_for(&self, event: Arc<WaitEvent>, timeout: Duration) -> Result<WaitOutcome> {
        let context_id = event.context_id();
        tokio::task::spawn_blocking(move || {
            event.wait(timeout)?;
            event
                .outcome()
                .ok_or_else(|| GuestCtlError::NotFound(format!("outcome for context {}", event.context_id())))
        })
        .await
        .map_err(|e| {
            warn!(context_id = %context_id, error = %e, "Wait task failed");
            GuestCtlError::Cancelled
        })?
    }

    /// Send `opcode` and wait for the guest's reply.
    ///
    /// The wait event is unregistered on every exit path. A guest-side
    /// failure surfaces as [`GuestCtlError::GuestError`].
    #[instrument(skip(self, params, categories), fields(session_id = self.session_id, object_id = self.object_id))]
    pub async fn call(
        &self,
        opcode: u32,
        params: &[HostParam],
        categories: &[EventCategory],
        timeout: Duration,
    ) -> Result<WaitOutcome> {
        let (context_id, event) = self.register_wait(categories)?;
        let _guard = PendingGuard {
            registry: &self.registry,
            context_id,
        };

        if let Err(e) = self.send_command(context_id, opcode, params).await {
            warn!(context_id = %context_id, error = %e, "Failed to send guest command");
            return Err(e);
        }

        let outcome = self.wait_for(event, timeout).await?;
        debug!(context_id = %context_id, result = outcome.result, "Guest command completed");
        outcome.into_result()
    }
}

impl fmt::Debug for GuestObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestObject")
            .field("session_id", &self.session_id)
            .field("object_id", &self.object_id)
            .finish_non_exhaustive()
    }
}

/// Unregisters (and cancels) a pending wait when the call ends, including
/// when the calling future is dropped mid-wait.
struct PendingGuard<'a> {
    registry: &'a EventRegistry,
    context_id: ContextId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(event) = self.registry.unregister(self.context_id) {
            // Releases a blocking waiter that is still parked.
            let _ = event.cancel();
        }
    }
}
