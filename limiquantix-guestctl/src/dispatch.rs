//! Routing of generic guest callbacks onto wait events.

use tracing::{debug, warn};

use crate::context::ContextId;
use crate::error::{GuestCtlError, Result};
use crate::payload::Payload;
use crate::registry::EventRegistry;
use crate::transport::HostParam;
use crate::wait_event::{RESULT_GUEST_ERROR, RESULT_SUCCESS};

/// Function code of a reply to an earlier host command.
pub const GUEST_MSG_REPLY: u32 = 1;

/// Function code of a progress notification.
pub const GUEST_MSG_PROGRESS_UPDATE: u32 = 2;

/// A callback delivered by the transport for one context id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCallback {
    /// Progress notification; carries nothing the waiter needs.
    ProgressUpdate,
    /// Reply to a command. A negative `guest_rc` is a guest-side failure.
    Reply { guest_rc: i32, payload: Payload },
}

impl HostCallback {
    /// Decode a callback from its function code and parameters.
    ///
    /// Replies carry `[payload type, guest rc, payload bytes]`.
    pub fn from_raw(function: u32, params: &[HostParam]) -> Result<Self> {
        match function {
            GUEST_MSG_PROGRESS_UPDATE => Ok(HostCallback::ProgressUpdate),
            GUEST_MSG_REPLY => {
                let [payload_type, guest_rc, data, ..] = params else {
                    return Err(GuestCtlError::InvalidArgument(format!(
                        "reply needs 3 parameters, got {}",
                        params.len()
                    )));
                };

                let payload_type = payload_type
                    .as_u32()
                    .ok_or_else(|| GuestCtlError::InvalidArgument("reply payload type is not a u32".to_string()))?;
                let guest_rc = guest_rc
                    .as_u32()
                    .ok_or_else(|| GuestCtlError::InvalidArgument("reply rc is not a u32".to_string()))?
                    as i32;
                let data = data
                    .as_bytes()
                    .ok_or_else(|| GuestCtlError::InvalidArgument("reply payload is not a buffer".to_string()))?;

                Ok(HostCallback::Reply {
                    guest_rc,
                    payload: Payload::copy_from(payload_type, data)?,
                })
            }
            other => Err(GuestCtlError::NotSupported(format!("guest callback function {}", other))),
        }
    }
}

impl EventRegistry {
    /// Deliver a transport callback to the event waiting on `context_id`.
    pub fn dispatch(&self, context_id: ContextId, callback: &HostCallback) -> Result<()> {
        match callback {
            HostCallback::ProgressUpdate => {
                debug!(context_id = %context_id, "Progress update from guest");
                Ok(())
            }
            HostCallback::Reply { guest_rc, payload } => {
                let (result, guest_result) = if *guest_rc >= 0 {
                    (RESULT_SUCCESS, 0)
                } else {
                    warn!(context_id = %context_id, guest_rc, "Guest reported failure");
                    (RESULT_GUEST_ERROR, *guest_rc)
                };
                self.signal_by_context(context_id, result, guest_result, Some(payload))
            }
        }
    }

    /// Decode and deliver a raw callback in one step.
    pub fn dispatch_raw(&self, context_id: ContextId, function: u32, params: &[HostParam]) -> Result<()> {
        let callback = HostCallback::from_raw(function, params)?;
        self.dispatch(context_id, &callback)
    }
}
