//! The push/pull signal protocol.
//!
//! A `Publisher` pushes items into a `Subscriber`, which in turn controls the
//! flow through the `Subscription` it received in `on_subscribe`. Data signals
//! (`on_next`, `try_on_next`) are never delivered concurrently to one
//! subscriber. `request` and `cancel` may be called from any thread.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::StreamError;


/// Demand value meaning "no limit".
pub const UNBOUNDED: u64 = u64::MAX;

/// Control handle held by a subscriber.
pub trait Subscription: Send + Sync {
    /// Ask for up to `n` more items. `n` must be positive.
    fn request(&self, n: u64);

    /// Stop the flow of items. Items already in flight may still arrive.
    fn cancel(&self);

    /// Diagnostics query. Returns `None` for attributes that are unknown or
    /// unset.
    fn scan(&self, _attr: Attr) -> Option<Scanned> { None }
}

/// Receiver of signals from a publisher.
pub trait Subscriber<T> {
    /// Called exactly once before any other signal.
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>);

    /// Deliver one item.
    fn on_next(&mut self, item: T);

    /// Terminal failure.
    fn on_error(&mut self, error: StreamError);

    /// Terminal success.
    fn on_complete(&mut self);

    /// Whether this subscriber wants items through `try_on_next`.
    fn is_conditional(&self) -> bool { false }

    /// Deliver one item and report whether it consumed a unit of demand.
    ///
    /// A `false` result tells the caller to offer the next item without
    /// waiting for a new `request`.
    fn try_on_next(&mut self, item: T) -> bool {
        self.on_next(item);
        true
    }
}

/// A subscriber that can be handed to another thread.
pub type BoxSubscriber<T> = Box<dyn Subscriber<T> + Send>;

/// Producer of items.
pub trait Publisher<T> {
    /// Attach a subscriber. The publisher calls `on_subscribe` on it before
    /// anything else.
    fn subscribe(&self, subscriber: BoxSubscriber<T>);
}


/// Keys for `Subscription::scan`.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Attr {
    /// The upstream subscription.
    Parent,
    /// Whether a terminal signal has been seen.
    Terminated,
    /// The last error recorded by the stage.
    Error,
}

/// Values returned by `Subscription::scan`.
#[derive(Clone)]
pub enum Scanned {
    /// See `Attr::Parent`.
    Parent(Arc<dyn Subscription>),
    /// See `Attr::Terminated`.
    Terminated(bool),
    /// See `Attr::Error`.
    Error(StreamError),
}

impl fmt::Debug for Scanned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scanned::Parent(_) => f.write_str("Parent(..)"),
            Scanned::Terminated(done) => f.debug_tuple("Terminated").field(done).finish(),
            Scanned::Error(err) => f.debug_tuple("Error").field(err).finish(),
        }
    }
}


/// Add `n` to an outstanding demand counter, saturating at `UNBOUNDED`.
/// Returns the previous value.
pub fn add_cap(requested: &AtomicU64, n: u64) -> u64 {
    let mut current = requested.load(Ordering::Acquire);
    loop {
        if current == UNBOUNDED {
            return UNBOUNDED;
        }
        let next = current.saturating_add(n);
        match requested.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(prev) => return prev,
            Err(actual) => current = actual,
        }
    }
}

/// Subtract `n` delivered items from a demand counter unless it is unbounded.
pub fn produced(requested: &AtomicU64, n: u64) {
    let mut current = requested.load(Ordering::Acquire);
    loop {
        if current == UNBOUNDED {
            return;
        }
        let next = current.saturating_sub(n);
        match requested.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return,
            Err(actual) => current = actual,
        }
    }
}


#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[test]
    fn add_cap_accumulates() {
        let r = AtomicU64::new(0);
        assert_eq!(add_cap(&r, 3), 0);
        assert_eq!(add_cap(&r, 4), 3);
        assert_eq!(r.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn add_cap_saturates() {
        let r = AtomicU64::new(UNBOUNDED - 1);
        add_cap(&r, 10);
        assert_eq!(r.load(Ordering::SeqCst), UNBOUNDED);
        assert_eq!(add_cap(&r, 1), UNBOUNDED);
    }

    #[test]
    fn produced_leaves_unbounded_alone() {
        let r = AtomicU64::new(UNBOUNDED);
        produced(&r, 5);
        assert_eq!(r.load(Ordering::SeqCst), UNBOUNDED);
        let r = AtomicU64::new(5);
        produced(&r, 2);
        assert_eq!(r.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn default_try_on_next_consumes() {
        struct Collect(Vec<i32>);
        impl Subscriber<i32> for Collect {
            fn on_subscribe(&mut self, _: Arc<dyn Subscription>) {}
            fn on_next(&mut self, item: i32) { self.0.push(item); }
            fn on_error(&mut self, _: StreamError) {}
            fn on_complete(&mut self) {}
        }
        let mut c = Collect(vec![]);
        assert!(!c.is_conditional());
        assert!(c.try_on_next(4));
        assert_eq!(c.0, vec![4]);
    }
}
