//! Mutation fan-out to live subscriptions.
//!
//! The tracker holds weak handles to every active view core and delivers
//! each store event to them in registration order, on the mutating caller's
//! thread. Delivery is atomic with respect to the mutation: the engine does
//! not return until every subscription has processed the event. A panicking
//! subscription is logged and skipped; the remaining subscriptions still
//! receive the event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::warn;

use crate::query::ReadCtx;
use crate::store::Event;
use crate::view::ViewCore;

/// Registry of live subscriptions.
#[derive(Default)]
pub struct ChangeTracker {
    subscribers: Mutex<Vec<(u64, Weak<Mutex<ViewCore>>)>>,
    next_id: Mutex<u64>,
}

impl ChangeTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a view core; delivery follows registration order.
    pub fn register(&self, core: &Arc<Mutex<ViewCore>>) -> u64 {
        let mut next = self.next_id.lock();
        let id = *next;
        *next += 1;
        self.subscribers.lock().push((id, Arc::downgrade(core)));
        id
    }

    /// Number of live subscriptions (dead handles pruned).
    pub fn subscriber_count(&self) -> usize {
        let mut subs = self.subscribers.lock();
        subs.retain(|(_, weak)| weak.strong_count() > 0);
        subs.len()
    }

    /// Delivers one event to every live subscription.
    pub fn dispatch(&self, ctx: ReadCtx<'_>, event: &Event) {
        // Snapshot under the lock so a subscription dropped mid-dispatch
        // cannot invalidate the iteration.
        let snapshot: Vec<(u64, Weak<Mutex<ViewCore>>)> = {
            let mut subs = self.subscribers.lock();
            subs.retain(|(_, weak)| weak.strong_count() > 0);
            subs.clone()
        };
        for (id, weak) in snapshot {
            let Some(core) = weak.upgrade() else {
                continue;
            };
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                core.lock().apply_event(ctx, event);
            }));
            if outcome.is_err() {
                warn!(subscription = id, "subscription panicked; skipped");
            }
        }
    }
}

impl std::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}
