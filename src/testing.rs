//! Sources, subscribers and hooks for exercising stages in tests.

use std::fmt::{self, Debug};
use std::iter::Peekable;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::error::StreamError;
use crate::hooks::DropHooks;
use crate::protocol::{add_cap, produced, BoxSubscriber, Publisher, Subscriber, Subscription, UNBOUNDED};


/// Requests and cancellations observed by a source.
#[derive(Default, Debug)]
pub struct SourceStats {
    requests: Mutex<Vec<u64>>,
    cancels: AtomicUsize,
}

impl SourceStats {
    /// Every `request(n)` received, in order.
    pub fn requests(&self) -> Vec<u64> { self.requests.lock().clone() }

    /// Number of `cancel()` calls received.
    pub fn cancel_count(&self) -> usize { self.cancels.load(Ordering::SeqCst) }

    fn record_request(&self, n: u64) { self.requests.lock().push(n); }

    fn record_cancel(&self) { self.cancels.fetch_add(1, Ordering::SeqCst); }
}

/// A subscription that only records what it is asked to do.
struct RecordingSubscription {
    stats: Arc<SourceStats>,
}

impl Subscription for RecordingSubscription {
    fn request(&self, n: u64) { self.stats.record_request(n); }
    fn cancel(&self) { self.stats.record_cancel(); }
}


/// A cold source emitting the items of an iterator, honouring demand and
/// cancellation.
///
/// Conditional subscribers are fed through `try_on_next`; items they do not
/// consume do not count against demand. Clones share their stats.
#[derive(Clone)]
pub struct IterPublisher<I> {
    items: I,
    stats: Arc<SourceStats>,
}

impl<I> IterPublisher<I>
    where I: IntoIterator + Clone,
{
    /// Create a source that replays `items` for every subscriber.
    pub fn new(items: I) -> IterPublisher<I> {
        IterPublisher { items, stats: Arc::new(SourceStats::default()) }
    }

    /// Requests and cancellations from all subscriptions so far.
    pub fn stats(&self) -> Arc<SourceStats> { self.stats.clone() }
}

impl<I> Publisher<I::Item> for IterPublisher<I>
    where I: IntoIterator + Clone,
          I::IntoIter: Send + 'static,
          I::Item: Send + 'static,
{
    fn subscribe(&self, mut subscriber: BoxSubscriber<I::Item>) {
        let subscription = Arc::new(IterSubscription {
            iter: Mutex::new(self.items.clone().into_iter().peekable()),
            subscriber: Mutex::new(None),
            conditional: subscriber.is_conditional(),
            requested: AtomicU64::new(0),
            wip: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            done: AtomicBool::new(false),
            stats: self.stats.clone(),
        });
        subscriber.on_subscribe(subscription.clone());
        *subscription.subscriber.lock() = Some(subscriber);
        subscription.drain();
    }
}

struct IterSubscription<I: Iterator> {
    iter: Mutex<Peekable<I>>,
    subscriber: Mutex<Option<BoxSubscriber<I::Item>>>,
    conditional: bool,
    requested: AtomicU64,
    wip: AtomicUsize,
    cancelled: AtomicBool,
    done: AtomicBool,
    stats: Arc<SourceStats>,
}

impl<I: Iterator> IterSubscription<I> {
    /// Serialize emission: whoever moves `wip` off zero emits until no more
    /// work was signalled in the meantime. Re-entrant calls from inside
    /// `on_next` only bump `wip`.
    fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            self.emit();
            missed = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if missed == 0 {
                break;
            }
        }
    }

    fn emit(&self) {
        let mut slot = self.subscriber.lock();
        let finished = match slot.as_mut() {
            Some(subscriber) => self.emit_to(subscriber),
            None => false,
        };
        if finished {
            *slot = None;
        }
    }

    /// Emit while there is demand, completing as soon as the iterator is
    /// exhausted whether or not demand remains. Returns `true` once the
    /// subscription is cancelled or completed.
    fn emit_to(&self, subscriber: &mut BoxSubscriber<I::Item>) -> bool {
        let mut iter = self.iter.lock();
        loop {
            if self.cancelled.load(Ordering::Acquire) || self.done.load(Ordering::Acquire) {
                return true;
            }
            if iter.peek().is_none() {
                self.done.store(true, Ordering::Release);
                subscriber.on_complete();
                continue;
            }
            if self.requested.load(Ordering::Acquire) == 0 {
                return false;
            }
            if let Some(item) = iter.next() {
                let consumed = if self.conditional {
                    subscriber.try_on_next(item)
                } else {
                    subscriber.on_next(item);
                    true
                };
                if consumed {
                    produced(&self.requested, 1);
                }
            }
        }
    }
}

impl<I> Subscription for IterSubscription<I>
    where I: Iterator + Send,
          I::Item: Send,
{
    fn request(&self, n: u64) {
        self.stats.record_request(n);
        if n == 0 {
            warn!("ignoring request for zero items");
            return;
        }
        add_cap(&self.requested, n);
        self.drain();
    }

    fn cancel(&self) {
        self.stats.record_cancel();
        self.cancelled.store(true, Ordering::Release);
    }
}


/// A source driven by hand from the test body.
///
/// It ignores demand and cancellation, so it can deliver signals a compliant
/// source never would.
pub struct TestPublisher<T> {
    subscriber: Arc<Mutex<Option<BoxSubscriber<T>>>>,
    stats: Arc<SourceStats>,
}

impl<T> Clone for TestPublisher<T> {
    fn clone(&self) -> TestPublisher<T> {
        TestPublisher {
            subscriber: self.subscriber.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<T> Default for TestPublisher<T> {
    fn default() -> TestPublisher<T> { TestPublisher::new() }
}

impl<T> TestPublisher<T> {
    /// Create a source with no subscriber.
    pub fn new() -> TestPublisher<T> {
        TestPublisher {
            subscriber: Arc::new(Mutex::new(None)),
            stats: Arc::new(SourceStats::default()),
        }
    }

    /// Requests and cancellations made through the subscription handed out
    /// by `subscribe`.
    pub fn stats(&self) -> Arc<SourceStats> { self.stats.clone() }

    /// Push an item with `on_next`.
    pub fn next(&self, item: T) {
        if let Some(subscriber) = self.subscriber.lock().as_mut() {
            subscriber.on_next(item);
        }
    }

    /// Push an item with `try_on_next`. Returns `false` when no subscriber is
    /// attached.
    pub fn try_next(&self, item: T) -> bool {
        match self.subscriber.lock().as_mut() {
            Some(subscriber) => subscriber.try_on_next(item),
            None => false,
        }
    }

    /// Signal `on_complete`.
    pub fn complete(&self) {
        if let Some(subscriber) = self.subscriber.lock().as_mut() {
            subscriber.on_complete();
        }
    }

    /// Signal `on_error`.
    pub fn error(&self, error: StreamError) {
        if let Some(subscriber) = self.subscriber.lock().as_mut() {
            subscriber.on_error(error);
        }
    }

    /// Call `on_subscribe` a second time with a fresh subscription and return
    /// its stats.
    pub fn resubscribe(&self) -> Arc<SourceStats> {
        let stats = Arc::new(SourceStats::default());
        if let Some(subscriber) = self.subscriber.lock().as_mut() {
            subscriber.on_subscribe(Arc::new(RecordingSubscription { stats: stats.clone() }));
        }
        stats
    }
}

impl<T> Publisher<T> for TestPublisher<T> {
    fn subscribe(&self, mut subscriber: BoxSubscriber<T>) {
        subscriber.on_subscribe(Arc::new(RecordingSubscription { stats: self.stats.clone() }));
        *self.subscriber.lock() = Some(subscriber);
    }
}


type Accept<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

struct Recorded<T> {
    subscription: Option<Arc<dyn Subscription>>,
    subscriptions: usize,
    values: Vec<T>,
    rejected: usize,
    errors: Vec<StreamError>,
    completions: usize,
}

/// A subscriber recording every signal it receives.
///
/// Clones share the same record, so one clone can be handed to a publisher
/// while the test inspects another.
pub struct TestSubscriber<T> {
    record: Arc<Mutex<Recorded<T>>>,
    initial_request: u64,
    accept: Option<Accept<T>>,
}

impl<T> Clone for TestSubscriber<T> {
    fn clone(&self) -> TestSubscriber<T> {
        TestSubscriber {
            record: self.record.clone(),
            initial_request: self.initial_request,
            accept: self.accept.clone(),
        }
    }
}

impl<T> TestSubscriber<T> {
    /// A plain subscriber requesting `initial_request` items on subscribe
    /// (nothing if zero).
    pub fn new(initial_request: u64) -> TestSubscriber<T> {
        TestSubscriber {
            record: Arc::new(Mutex::new(Recorded {
                subscription: None,
                subscriptions: 0,
                values: vec![],
                rejected: 0,
                errors: vec![],
                completions: 0,
            })),
            initial_request,
            accept: None,
        }
    }

    /// A plain subscriber with unbounded demand.
    pub fn unbounded() -> TestSubscriber<T> { TestSubscriber::new(UNBOUNDED) }

    /// A conditional subscriber keeping only the items `accept` approves of
    /// when they arrive through `try_on_next`.
    pub fn conditional<F>(initial_request: u64, accept: F) -> TestSubscriber<T>
        where F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        TestSubscriber { accept: Some(Arc::new(accept)), ..TestSubscriber::new(initial_request) }
    }

    /// The subscription received in `on_subscribe`.
    pub fn subscription(&self) -> Option<Arc<dyn Subscription>> {
        self.record.lock().subscription.clone()
    }

    /// Number of `on_subscribe` calls seen.
    pub fn subscription_count(&self) -> usize { self.record.lock().subscriptions }

    /// Request more items through the stored subscription.
    pub fn request(&self, n: u64) {
        if let Some(subscription) = self.subscription() {
            subscription.request(n);
        }
    }

    /// Cancel the stored subscription.
    pub fn cancel(&self) {
        if let Some(subscription) = self.subscription() {
            subscription.cancel();
        }
    }

    /// Number of items refused by the acceptance predicate.
    pub fn rejected(&self) -> usize { self.record.lock().rejected }

    /// Errors received, in order.
    pub fn errors(&self) -> Vec<StreamError> { self.record.lock().errors.clone() }

    /// Number of `on_complete` calls seen.
    pub fn completions(&self) -> usize { self.record.lock().completions }

    /// Whether exactly one successful completion and no error arrived.
    pub fn is_completed(&self) -> bool {
        let record = self.record.lock();
        record.completions == 1 && record.errors.is_empty()
    }

    /// Total number of terminal signals received.
    pub fn terminal_count(&self) -> usize {
        let record = self.record.lock();
        record.completions + record.errors.len()
    }
}

impl<T: Clone> TestSubscriber<T> {
    /// Items received (and accepted), in order.
    pub fn values(&self) -> Vec<T> { self.record.lock().values.clone() }
}

impl<T> Subscriber<T> for TestSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        {
            let mut record = self.record.lock();
            record.subscriptions += 1;
            record.subscription = Some(subscription.clone());
        }
        if self.initial_request > 0 {
            subscription.request(self.initial_request);
        }
    }

    fn on_next(&mut self, item: T) {
        self.record.lock().values.push(item);
    }

    fn on_error(&mut self, error: StreamError) {
        self.record.lock().errors.push(error);
    }

    fn on_complete(&mut self) {
        self.record.lock().completions += 1;
    }

    fn is_conditional(&self) -> bool { self.accept.is_some() }

    fn try_on_next(&mut self, item: T) -> bool {
        let keep = self.accept.as_ref().map_or(true, |accept| accept(&item));
        let mut record = self.record.lock();
        if keep {
            record.values.push(item);
        } else {
            record.rejected += 1;
        }
        keep
    }
}


/// Drop hooks that remember what they were given.
#[derive(Default)]
pub struct CountingHooks {
    items: Mutex<Vec<String>>,
    errors: Mutex<Vec<StreamError>>,
}

impl CountingHooks {
    /// `Debug` renderings of dropped items.
    pub fn dropped_items(&self) -> Vec<String> { self.items.lock().clone() }

    /// Dropped errors.
    pub fn dropped_errors(&self) -> Vec<StreamError> { self.errors.lock().clone() }

    /// Labels of dropped errors.
    pub fn dropped_error_labels(&self) -> Vec<&'static str> {
        self.errors.lock().iter().map(StreamError::as_label).collect()
    }
}

impl DropHooks for CountingHooks {
    fn on_next_dropped(&self, item: &dyn Debug) {
        self.items.lock().push(format!("{:?}", item));
    }

    fn on_error_dropped(&self, error: StreamError) {
        self.errors.lock().push(error);
    }
}

impl fmt::Debug for CountingHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingHooks")
            .field("items", &self.items.lock().len())
            .field("errors", &self.errors.lock().len())
            .finish()
    }
}
