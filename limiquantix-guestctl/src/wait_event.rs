//! Single-shot wait events.
//!
//! A `WaitEvent` represents one outstanding request. It starts `Pending`
//! and ends either `Signaled` (a reply arrived) or `Cancelled` (the caller
//! or the registry gave up). Neither terminal state can be left.
//!
//! ```text
//!            signal()
//!   Pending ─────────► Signaled
//!      │
//!      │ cancel()
//!      ▼
//!   Cancelled
//! ```

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::category::EventCategory;
use crate::context::ContextId;
use crate::error::{GuestCtlError, Result};
use crate::payload::Payload;

/// Primary result stored for a successful reply.
pub const RESULT_SUCCESS: i32 = 0;

/// Primary result stored when the guest reported a failure; the guest's own
/// code is kept as the secondary result.
pub const RESULT_GUEST_ERROR: i32 = -1;

/// Lifecycle state of a wait event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Pending,
    Signaled,
    Cancelled,
}

/// What a signaler stored in the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOutcome {
    /// Host-side result code.
    pub result: i32,
    /// Guest-side result code.
    pub guest_result: i32,
    pub payload: Option<Payload>,
}

impl WaitOutcome {
    pub fn is_success(&self) -> bool {
        self.result == RESULT_SUCCESS
    }

    /// Turn a non-success primary result into a `GuestError` carrying the guest's code.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(GuestCtlError::GuestError {
                code: self.guest_result,
            })
        }
    }
}

struct Inner {
    state: WaitState,
    outcome: Option<WaitOutcome>,
}

/// Synchronization handle for one outstanding guest request.
pub struct WaitEvent {
    context_id: ContextId,
    categories: BTreeSet<EventCategory>,
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl WaitEvent {
    pub fn new(context_id: ContextId, categories: impl IntoIterator<Item = EventCategory>) -> Self {
        Self {
            context_id,
            categories: categories.into_iter().collect(),
            inner: Mutex::new(Inner {
                state: WaitState::Pending,
                outcome: None,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    /// Categories fixed at registration time.
    pub fn categories(&self) -> &BTreeSet<EventCategory> {
        &self.categories
    }

    pub fn state(&self) -> WaitState {
        self.inner.lock().state
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == WaitState::Cancelled
    }

    /// Block until the event is signaled, cancelled, or `timeout` elapses.
    ///
    /// A zero timeout waits indefinitely. Returns the stored primary result.
    /// Must not be called while holding the registry lock.
    pub fn wait(&self, timeout: Duration) -> Result<i32> {
        let mut inner = self.inner.lock();

        if inner.state == WaitState::Cancelled {
            return Err(GuestCtlError::Cancelled);
        }

        let deadline = if timeout.is_zero() {
            None
        } else {
            Instant::now().checked_add(timeout)
        };

        while inner.state == WaitState::Pending {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut inner, deadline).timed_out() {
                        break;
                    }
                }
                None => self.cond.wait(&mut inner),
            }
        }

        match inner.state {
            WaitState::Cancelled => Err(GuestCtlError::Cancelled),
            WaitState::Signaled => Ok(inner
                .outcome
                .as_ref()
                .map(|outcome| outcome.result)
                .unwrap_or(RESULT_SUCCESS)),
            WaitState::Pending => {
                debug!(context_id = %self.context_id, timeout_ms = timeout.as_millis() as u64, "Wait timed out");
                Err(GuestCtlError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Store the outcome and wake the waiter.
    ///
    /// The payload is copied before any state changes, so a failed copy
    /// leaves the event pending.
    pub fn signal(&self, result: i32, guest_result: i32, payload: Option<&Payload>) -> Result<()> {
        self.check_pending()?;

        let payload = payload.map(Payload::try_clone).transpose()?;

        let mut inner = self.inner.lock();
        // Re-check: a cancel may have landed while the payload was copied.
        match inner.state {
            WaitState::Cancelled => return Err(GuestCtlError::Cancelled),
            WaitState::Signaled => return Err(GuestCtlError::AlreadySignaled),
            WaitState::Pending => {}
        }

        inner.outcome = Some(WaitOutcome {
            result,
            guest_result,
            payload,
        });
        inner.state = WaitState::Signaled;
        self.cond.notify_all();

        trace!(context_id = %self.context_id, result, guest_result, "Wait event signaled");
        Ok(())
    }

    /// Cancel the event and wake the waiter. Cancellation is permanent.
    pub fn cancel(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            WaitState::Cancelled => Err(GuestCtlError::AlreadyCancelled),
            WaitState::Signaled => Err(GuestCtlError::AlreadySignaled),
            WaitState::Pending => {
                inner.state = WaitState::Cancelled;
                self.cond.notify_all();
                trace!(context_id = %self.context_id, "Wait event cancelled");
                Ok(())
            }
        }
    }

    /// Copy of the stored outcome, if the event was signaled.
    pub fn outcome(&self) -> Option<WaitOutcome> {
        let inner = self.inner.lock();
        match inner.state {
            WaitState::Signaled => inner.outcome.clone(),
            _ => None,
        }
    }

    /// Copy of the stored payload, if any.
    pub fn payload(&self) -> Option<Payload> {
        self.outcome().and_then(|outcome| outcome.payload)
    }

    fn check_pending(&self) -> Result<()> {
        match self.inner.lock().state {
            WaitState::Pending => Ok(()),
            WaitState::Cancelled => Err(GuestCtlError::Cancelled),
            WaitState::Signaled => Err(GuestCtlError::AlreadySignaled),
        }
    }
}

impl std::fmt::Debug for WaitEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitEvent")
            .field("context_id", &self.context_id)
            .field("categories", &self.categories)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn event() -> WaitEvent {
        WaitEvent::new(ContextId::from_raw(42), [])
    }

    #[test]
    fn test_signal_then_wait() {
        let ev = event();
        let payload = Payload::new(3, b"ok".to_vec());
        ev.signal(RESULT_SUCCESS, 0, Some(&payload)).unwrap();

        assert_eq!(ev.wait(Duration::from_millis(10)).unwrap(), RESULT_SUCCESS);
        assert_eq!(ev.payload(), Some(payload));
        assert_eq!(ev.state(), WaitState::Signaled);
    }

    #[test]
    fn test_second_signal_rejected() {
        let ev = event();
        ev.signal(RESULT_SUCCESS, 0, Some(&Payload::new(1, b"first".to_vec())))
            .unwrap();

        let second = ev.signal(RESULT_GUEST_ERROR, -5, Some(&Payload::new(1, b"second".to_vec())));
        assert_eq!(second, Err(GuestCtlError::AlreadySignaled));

        assert_eq!(ev.wait(Duration::ZERO).unwrap(), RESULT_SUCCESS);
        assert_eq!(ev.payload().unwrap().data(), b"first");
    }

    #[test]
    fn test_signal_after_cancel_fails() {
        let ev = event();
        ev.cancel().unwrap();

        let result = ev.signal(RESULT_SUCCESS, 0, Some(&Payload::new(1, b"late".to_vec())));
        assert_eq!(result, Err(GuestCtlError::Cancelled));
        assert!(ev.outcome().is_none());
    }

    #[test]
    fn test_wait_after_cancel_returns_immediately() {
        let ev = event();
        ev.cancel().unwrap();

        let started = Instant::now();
        // Zero timeout would block forever if cancellation were not durable.
        assert_eq!(ev.wait(Duration::ZERO), Err(GuestCtlError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_cancel_twice() {
        let ev = event();
        ev.cancel().unwrap();
        assert_eq!(ev.cancel(), Err(GuestCtlError::AlreadyCancelled));
    }

    #[test]
    fn test_cancel_after_signal_keeps_outcome() {
        let ev = event();
        ev.signal(RESULT_SUCCESS, 0, None).unwrap();
        assert_eq!(ev.cancel(), Err(GuestCtlError::AlreadySignaled));
        assert_eq!(ev.wait(Duration::from_millis(1)).unwrap(), RESULT_SUCCESS);
    }

    #[test]
    fn test_wait_timeout() {
        let ev = event();
        let result = ev.wait(Duration::from_millis(20));
        assert_eq!(result, Err(GuestCtlError::Timeout { timeout_ms: 20 }));
        assert_eq!(ev.state(), WaitState::Pending);
    }

    #[test]
    fn test_signal_from_other_thread_wakes_waiter() {
        let ev = Arc::new(event());
        let signaler = {
            let ev = Arc::clone(&ev);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ev.signal(RESULT_SUCCESS, 0, Some(&Payload::new(9, b"reply".to_vec())))
            })
        };

        assert_eq!(ev.wait(Duration::ZERO).unwrap(), RESULT_SUCCESS);
        signaler.join().unwrap().unwrap();
        assert_eq!(ev.payload().unwrap().type_tag(), 9);
    }

    #[test]
    fn test_cancel_from_other_thread_wakes_waiter() {
        let ev = Arc::new(event());
        let canceller = {
            let ev = Arc::clone(&ev);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ev.cancel()
            })
        };

        assert_eq!(ev.wait(Duration::from_secs(10)), Err(GuestCtlError::Cancelled));
        canceller.join().unwrap().unwrap();
    }

    #[test]
    fn test_guest_error_outcome() {
        let ev = event();
        ev.signal(RESULT_GUEST_ERROR, -22, None).unwrap();
        let outcome = ev.outcome().unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.into_result(), Err(GuestCtlError::GuestError { code: -22 }));
    }
}
