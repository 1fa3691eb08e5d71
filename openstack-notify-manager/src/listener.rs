//! Listener registration and snapshot-on-iterate fan-out.

use std::sync::Arc;

use arc_swap::ArcSwap;
use openstack_notify_core::OpenStackEvent;

/// Receives parsed notifications. Implementations must be re-entrant: events
/// for different services may be dispatched concurrently from different
/// broker threads, though any single event is delivered to listeners in
/// registration order.
///
/// A panicking or long-running listener only affects itself — the manager
/// catches panics and keeps invoking the rest of the snapshot.
pub trait Listener: Send + Sync {
    fn on_event(&self, event: &OpenStackEvent);
}

impl<F> Listener for F
where
    F: Fn(&OpenStackEvent) + Send + Sync,
{
    fn on_event(&self, event: &OpenStackEvent) {
        self(event)
    }
}

/// Ordered, concurrently-mutable set of listeners.
///
/// Mutation (`add`/`remove`) builds a new `Vec` and swaps it in; readers that
/// already grabbed a snapshot via `load` keep iterating the old one to
/// completion. No lock is held during dispatch.
pub struct ListenerSet {
    listeners: ArcSwap<Vec<Arc<dyn Listener>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Append a listener, preserving registration order.
    pub fn add(&self, listener: Arc<dyn Listener>) {
        self.listeners.rcu(|current| {
            let mut next = (**current).clone();
            next.push(Arc::clone(&listener));
            next
        });
    }

    /// Remove every instance matching `Arc::ptr_eq`.
    pub fn remove(&self, listener: &Arc<dyn Listener>) {
        self.listeners.rcu(|current| {
            current
                .iter()
                .filter(|l| !Arc::ptr_eq(l, listener))
                .cloned()
                .collect::<Vec<_>>()
        });
    }

    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch `event` to a consistent snapshot of listeners, in registration
    /// order. A listener that panics is logged and skipped; the rest of the
    /// snapshot still runs.
    pub fn dispatch(&self, event: &OpenStackEvent) {
        let snapshot = self.listeners.load();
        for listener in snapshot.iter() {
            let listener = Arc::clone(listener);
            let event_ref = event;
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event_ref);
            }));
            if let Err(e) = result {
                tracing::error!("listener callback panicked: {e:?}");
            }
        }
    }
}

impl Default for ListenerSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openstack_notify_core::OpenStackEventBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_event() -> OpenStackEvent {
        OpenStackEventBuilder::new("cluster-a", "nova", "compute.instance.create.end").build()
    }

    #[test]
    fn dispatch_invokes_listeners_in_registration_order() {
        let set = ListenerSet::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let order_a = Arc::clone(&order);
        set.add(Arc::new(move |_: &OpenStackEvent| order_a.lock().unwrap().push("a")));
        let order_b = Arc::clone(&order);
        set.add(Arc::new(move |_: &OpenStackEvent| order_b.lock().unwrap().push("b")));

        set.dispatch(&sample_event());

        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn a_panicking_listener_does_not_block_the_rest() {
        let set = ListenerSet::new();
        let called = Arc::new(AtomicUsize::new(0));

        set.add(Arc::new(|_: &OpenStackEvent| panic!("boom")));
        let called_clone = Arc::clone(&called);
        set.add(Arc::new(move |_: &OpenStackEvent| {
            called_clone.fetch_add(1, Ordering::SeqCst);
        }));

        set.dispatch(&sample_event());

        assert_eq!(called.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_drops_matching_listener_by_identity() {
        let set = ListenerSet::new();
        let listener: Arc<dyn Listener> = Arc::new(|_: &OpenStackEvent| {});
        set.add(Arc::clone(&listener));
        assert_eq!(set.len(), 1);

        set.remove(&listener);
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn mutation_during_iteration_does_not_affect_in_flight_snapshot() {
        let set = ListenerSet::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_clone = Arc::clone(&seen);
        let self_mutating: Arc<dyn Listener> = Arc::new(move |_: &OpenStackEvent| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });
        set.add(Arc::clone(&self_mutating));

        let snapshot_len_before = set.len();
        set.add(Arc::new(|_: &OpenStackEvent| {}));
        assert_eq!(snapshot_len_before, 1);
        assert_eq!(set.len(), 2);
    }
}
