//! Boundary to the host/guest channel.
//!
//! The channel itself lives outside this crate. All the correlation layer
//! needs is a way to send a command tagged with a context id; replies come
//! back through [`EventRegistry::dispatch`](crate::EventRegistry::dispatch).

pub mod mock;

use async_trait::async_trait;
use bytes::Bytes;

use crate::context::ContextId;
use crate::error::Result;

pub use mock::{MockTransport, SentCommand};

/// One parameter of a host command or guest callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostParam {
    U32(u32),
    U64(u64),
    Bytes(Bytes),
    Str(String),
}

impl HostParam {
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            HostParam::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            HostParam::U64(v) => Some(*v),
            HostParam::U32(v) => Some(u64::from(*v)),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            HostParam::Bytes(b) => Some(b),
            HostParam::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

/// Channel used to deliver commands to the guest agent.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `opcode` with `params`, tagged with `context_id`.
    async fn send_command(&self, context_id: ContextId, opcode: u32, params: &[HostParam]) -> Result<()>;
}
