//! Event registry.
//!
//! Owns every live [`WaitEvent`] and indexes it two ways:
//!
//! ```text
//!   events:  ContextId ──────────────► Arc<WaitEvent>
//!   groups:  EventCategory ──► { ContextId, ... }   (fan-out index)
//! ```
//!
//! Every `(category, context id)` pair in `groups` also exists in
//! `events`. Both maps are guarded by one mutex. Waiting on an event never
//! happens under that mutex: callers receive an `Arc<WaitEvent>` and block
//! on it after `register` returns.
//!
//! The registry never removes signaled events on its own. Whoever
//! registered an event calls [`EventRegistry::unregister`] once it has
//! consumed the outcome.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::category::EventCategory;
use crate::context::{ContextId, SequenceCounter, MAX_CONTEXTS};
use crate::error::{GuestCtlError, Result};
use crate::payload::Payload;
use crate::wait_event::{WaitEvent, RESULT_SUCCESS};

#[derive(Default)]
struct RegistryInner {
    events: HashMap<ContextId, Arc<WaitEvent>>,
    groups: HashMap<EventCategory, BTreeSet<ContextId>>,
}

impl RegistryInner {
    fn remove_from_groups(&mut self, context_id: ContextId, categories: &BTreeSet<EventCategory>) {
        for category in categories {
            if let Some(members) = self.groups.get_mut(category) {
                members.remove(&context_id);
                if members.is_empty() {
                    self.groups.remove(category);
                }
            }
        }
    }
}

/// Registry of outstanding guest requests.
pub struct EventRegistry {
    counter: Arc<SequenceCounter>,
    inner: Mutex<RegistryInner>,
}

impl EventRegistry {
    /// Create a registry drawing sequence numbers from the process-wide counter.
    pub fn new() -> Self {
        Self::with_counter(SequenceCounter::process_wide())
    }

    /// Create a registry with an explicit sequence counter.
    pub fn with_counter(counter: Arc<SequenceCounter>) -> Self {
        Self {
            counter,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    pub fn counter(&self) -> &Arc<SequenceCounter> {
        &self.counter
    }

    /// Register a wait for a fresh context id.
    ///
    /// Sequence values still held by a live event are skipped, so a wrapped
    /// counter never aliases an outstanding request.
    pub fn register(
        &self,
        session_id: u32,
        object_id: u32,
        categories: &[EventCategory],
    ) -> Result<(ContextId, Arc<WaitEvent>)> {
        let mut inner = self.inner.lock();

        let context_id = self.next_free_id(&inner, session_id, object_id)?;

        inner
            .events
            .try_reserve(1)
            .map_err(|e| GuestCtlError::OutOfMemory(format!("registering event: {}", e)))?;
        inner
            .groups
            .try_reserve(categories.len())
            .map_err(|e| GuestCtlError::OutOfMemory(format!("registering event groups: {}", e)))?;

        let event = Arc::new(WaitEvent::new(context_id, categories.iter().copied()));

        for category in event.categories() {
            inner.groups.entry(*category).or_default().insert(context_id);
        }
        inner.events.insert(context_id, Arc::clone(&event));

        debug!(
            context_id = %context_id,
            session_id,
            object_id,
            sequence = context_id.sequence(),
            categories = ?event.categories(),
            "Registered wait event"
        );

        Ok((context_id, event))
    }

    fn next_free_id(&self, inner: &RegistryInner, session_id: u32, object_id: u32) -> Result<ContextId> {
        for _ in 0..MAX_CONTEXTS {
            let context_id = self.counter.generate(session_id, object_id)?;
            if !inner.events.contains_key(&context_id) {
                return Ok(context_id);
            }
            warn!(
                context_id = %context_id,
                "Sequence wrapped onto a live context id, skipping"
            );
        }

        Err(GuestCtlError::ContextIdsExhausted {
            session_id,
            object_id,
        })
    }

    /// Signal the event registered under `context_id`.
    ///
    /// A signaled event leaves its category sets, so category fan-out no
    /// longer sees it. The entry stays reachable by context id; the owner
    /// removes it with `unregister`.
    pub fn signal_by_context(
        &self,
        context_id: ContextId,
        result: i32,
        guest_result: i32,
        payload: Option<&Payload>,
    ) -> Result<()> {
        let mut inner = self.inner.lock();

        let event = inner
            .events
            .get(&context_id)
            .cloned()
            .ok_or_else(|| GuestCtlError::NotFound(format!("context id {}", context_id)))?;

        debug!(context_id = %context_id, result, guest_result, "Signaling wait event");
        event.signal(result, guest_result, payload)?;
        inner.remove_from_groups(context_id, event.categories());
        Ok(())
    }

    /// Signal every event subscribed to `category`.
    ///
    /// A signaled event leaves every category index, so a later signal on
    /// another of its categories cannot complete it a second time. It stays
    /// reachable by context id until unregistered.
    ///
    /// Returns the number of events signaled.
    pub fn signal_by_category(&self, category: EventCategory, payload: &Payload) -> Result<usize> {
        let mut inner = self.inner.lock();

        // Snapshot first; the index is mutated below.
        let members: Vec<ContextId> = inner
            .groups
            .get(&category)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default();

        if members.is_empty() {
            return Err(GuestCtlError::NotFound(format!("no waiters for category {}", category)));
        }

        let mut signaled = 0;
        let mut first_error = None;

        for context_id in members {
            let Some(event) = inner.events.get(&context_id).cloned() else {
                continue;
            };

            match event.signal(RESULT_SUCCESS, 0, Some(payload)) {
                Ok(()) => {
                    signaled += 1;
                    inner.remove_from_groups(context_id, event.categories());
                }
                Err(e) => {
                    warn!(
                        context_id = %context_id,
                        category = %category,
                        error = %e,
                        "Failed to signal wait event"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        debug!(category = %category, signaled, "Signaled category");

        match first_error {
            Some(e) if signaled == 0 => Err(e),
            _ => Ok(signaled),
        }
    }

    /// Cancel every live event, unblocking all waiters.
    ///
    /// Nothing is removed; owners still unregister their events. Returns the
    /// number of events that were pending and are now cancelled.
    pub fn cancel_all(&self) -> usize {
        let inner = self.inner.lock();

        let cancelled = inner
            .events
            .values()
            .filter(|event| event.cancel().is_ok())
            .count();

        debug!(live = inner.events.len(), cancelled, "Cancelled all wait events");
        cancelled
    }

    /// Remove an event from the registry. Returns the removed handle.
    pub fn unregister(&self, context_id: ContextId) -> Option<Arc<WaitEvent>> {
        let mut inner = self.inner.lock();

        let event = inner.events.remove(&context_id)?;
        inner.remove_from_groups(context_id, event.categories());

        debug!(context_id = %context_id, remaining = inner.events.len(), "Unregistered wait event");
        Some(event)
    }

    pub fn get(&self, context_id: ContextId) -> Option<Arc<WaitEvent>> {
        self.inner.lock().events.get(&context_id).cloned()
    }

    pub fn contains(&self, context_id: ContextId) -> bool {
        self.inner.lock().events.contains_key(&context_id)
    }

    /// Number of live events.
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    /// Number of events still reachable through `category`.
    pub fn category_len(&self, category: EventCategory) -> usize {
        self.inner
            .lock()
            .groups
            .get(&category)
            .map(BTreeSet::len)
            .unwrap_or(0)
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}
