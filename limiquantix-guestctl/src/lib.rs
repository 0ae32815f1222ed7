//! # limiquantix Guest Control
//!
//! Host-side correlation layer for commands sent to a VM's guest agent.
//!
//! Each outstanding request gets a [`ContextId`] that packs the session,
//! the guest object and a rolling sequence number. The id travels with the
//! command; when the guest answers, the reply is routed back to the
//! [`WaitEvent`] registered under the same id. Streamed tool output (`ls`,
//! `stat`, `mktemp`) is reassembled into [`StreamBlock`]s of key/value pairs.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  call()   ┌────────────────┐  send_command  ┌───────────┐
//! │  GuestObject  │──────────►│  EventRegistry │               │ Transport │
//! │ (session/obj) │           │  id ─► event   │◄──dispatch────│  (guest)  │
//! └───────────────┘           │  cat ─► {ids}  │               └─────┬─────┘
//!                             └────────────────┘                     │ bytes
//!                                                                    ▼
//!                                                ┌──────────────────────────┐
//!                                                │ StreamCollector          │
//!                                                │  └ StreamReassembler     │
//!                                                │     ─► StreamBlock       │
//!                                                │        ─► FsObjData      │
//!                                                └──────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use limiquantix_guestctl::{EventRegistry, GuestObject, GuestCtlConfig, MockTransport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = GuestCtlConfig::load();
//!     let registry = Arc::new(EventRegistry::new());
//!     let transport = Arc::new(MockTransport::new());
//!
//!     let object = GuestObject::new(1, 7, registry, transport).unwrap();
//!     let outcome = object
//!         .call(3, &[], &[], config.default_wait_timeout())
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod category;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod fs_obj;
pub mod object;
pub mod payload;
pub mod registry;
pub mod stream;
pub mod transport;
pub mod wait_event;

pub use category::EventCategory;
pub use config::{ConfigError, GuestCtlConfig, StreamConfig, DEFAULT_CONFIG_PATH};
pub use context::{ContextId, SequenceCounter, MAX_CONTEXTS, MAX_OBJECTS, MAX_SESSIONS};
pub use dispatch::{HostCallback, GUEST_MSG_PROGRESS_UPDATE, GUEST_MSG_REPLY};
pub use error::{GuestCtlError, Result};
pub use fs_obj::{FsObjData, FsObjType};
pub use object::GuestObject;
pub use payload::Payload;
pub use registry::EventRegistry;
pub use stream::{Collected, ParseStatus, StreamBlock, StreamCollector, StreamReassembler};
pub use transport::{HostParam, MockTransport, SentCommand, Transport};
pub use wait_event::{WaitEvent, WaitOutcome, WaitState, RESULT_GUEST_ERROR, RESULT_SUCCESS};
