//! Fan-out of "index completed" notifications to subscribers, each isolated
//! from the others: one panicking callback is caught and logged, the rest
//! still run, in registration order.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::report::IndexReport;

type Callback = Arc<dyn Fn(&IndexReport) + Send + Sync>;

/// Dropping the guard does nothing; call [`Unsubscribe::call`] (or just
/// `unsubscribe()`, its function-call sugar) to deregister.
pub struct Unsubscribe {
    id: u64,
    bus: CallbackBus,
}

impl Unsubscribe {
    pub fn call(self) {
        self.bus.remove(self.id);
    }
}

#[derive(Clone, Default)]
pub struct CallbackBus {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, Callback)>>,
}

impl CallbackBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback`, to be invoked (in registration order, after
    /// every previously-registered and still-subscribed callback) on every
    /// subsequent [`CallbackBus::emit`]. Returns a handle that deregisters
    /// it; safe to call even from inside a callback during emission.
    pub fn subscribe(&self, callback: impl Fn(&IndexReport) + Send + Sync + 'static) -> Unsubscribe {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.callbacks.lock().push((id, Arc::new(callback)));
        Unsubscribe { id, bus: self.clone() }
    }

    fn remove(&self, id: u64) {
        self.inner.callbacks.lock().retain(|(cid, _)| *cid != id);
    }

    /// Invokes every currently-registered callback with `report`, in
    /// registration order. A callback that panics is caught and logged;
    /// later callbacks still run. Snapshots the callback list first, so a
    /// callback unsubscribing itself or another mid-emission only affects
    /// the *next* emission.
    pub fn emit(&self, report: &IndexReport) {
        let snapshot: Vec<Callback> = self.inner.callbacks.lock().iter().map(|(_, cb)| cb.clone()).collect();
        for callback in snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| callback(report)));
            if let Err(panic) = result {
                let message = panic_message(&panic);
                tracing::error!(error = %message, "onIndexed callback panicked; continuing with remaining subscribers");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.callbacks.lock().len()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn callbacks_run_in_registration_order() {
        let bus = CallbackBus::new();
        let order = Arc::new(StdMutex::new(Vec::new()));

        let o1 = order.clone();
        bus.subscribe(move |_| o1.lock().unwrap().push(1));
        let o2 = order.clone();
        bus.subscribe(move |_| o2.lock().unwrap().push(2));

        bus.emit(&IndexReport::default());
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn unsubscribe_stops_future_emissions_only() {
        let bus = CallbackBus::new();
        let count = Arc::new(StdMutex::new(0));

        let c = count.clone();
        let handle = bus.subscribe(move |_| *c.lock().unwrap() += 1);

        bus.emit(&IndexReport::default());
        handle.call();
        bus.emit(&IndexReport::default());

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn panicking_callback_does_not_block_later_callbacks() {
        let bus = CallbackBus::new();
        let ran = Arc::new(StdMutex::new(false));

        bus.subscribe(|_| panic!("boom"));
        let r = ran.clone();
        bus.subscribe(move |_| *r.lock().unwrap() = true);

        bus.emit(&IndexReport::default());
        assert!(*ran.lock().unwrap());
    }
}
