//! Mock transport for testing and development.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::context::ContextId;
use crate::dispatch::HostCallback;
use crate::error::{GuestCtlError, Result};
use crate::registry::EventRegistry;
use crate::transport::{HostParam, Transport};

/// Produces the guest's answer to a command, or `None` to stay silent.
pub type Responder = dyn Fn(ContextId, u32, &[HostParam]) -> Option<HostCallback> + Send + Sync;

/// A command captured by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    pub context_id: ContextId,
    pub opcode: u32,
    pub params: Vec<HostParam>,
}

/// In-memory transport that records every command.
///
/// With a responder attached, each command is answered by dispatching the
/// responder's callback into the registry from a spawned task, the way a
/// real channel delivers replies from its own receive loop.
pub struct MockTransport {
    sent: Mutex<Vec<SentCommand>>,
    offline: AtomicBool,
    reply_delay: Duration,
    responder: Option<(Arc<EventRegistry>, Arc<Responder>)>,
}

impl MockTransport {
    /// Create a transport that records commands and never replies.
    pub fn new() -> Self {
        info!("Creating mock guest transport");
        Self {
            sent: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            reply_delay: Duration::ZERO,
            responder: None,
        }
    }

    /// Create a transport that answers through `registry`.
    pub fn with_responder<F>(registry: Arc<EventRegistry>, responder: F) -> Self
    where
        F: Fn(ContextId, u32, &[HostParam]) -> Option<HostCallback> + Send + Sync + 'static,
    {
        let responder: Arc<Responder> = Arc::new(responder);
        Self {
            responder: Some((registry, responder)),
            ..Self::new()
        }
    }

    /// Delay each reply by `delay`.
    pub fn reply_after(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    /// Make subsequent sends fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Commands sent so far, oldest first.
    pub fn sent(&self) -> Vec<SentCommand> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    #[instrument(skip(self, params), fields(context_id = %context_id))]
    async fn send_command(&self, context_id: ContextId, opcode: u32, params: &[HostParam]) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GuestCtlError::Transport("mock channel is offline".to_string()));
        }

        debug!(opcode, params = params.len(), "Mock command sent");
        self.sent.lock().push(SentCommand {
            context_id,
            opcode,
            params: params.to_vec(),
        });

        let Some((registry, responder)) = &self.responder else {
            return Ok(());
        };
        let Some(callback) = responder(context_id, opcode, params) else {
            return Ok(());
        };

        let registry = Arc::clone(registry);
        let delay = self.reply_delay;
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = registry.dispatch(context_id, &callback) {
                warn!(context_id = %context_id, error = %e, "Mock reply was not delivered");
            }
        });

        Ok(())
    }
}
