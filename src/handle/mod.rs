//! The handle stage: a per-item transform/filter operator.
//!
//! For every upstream item the stage calls a user handler with a
//! `SynchronousSink`. The handler may emit zero or one value, and may end the
//! stream early. Depending on whether the downstream subscriber is
//! conditional, the stage runs one of two signal paths:
//!
//! - the standard path forwards with `on_next` and asks upstream for one more
//!   item whenever an item was filtered out,
//! - the fused path forwards with `try_on_next` and reports filtered items
//!   back to upstream as "not consumed", leaving demand untouched.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{BoxError, StreamError};
use crate::hooks::{default_hooks, DropHooks};
use crate::protocol::{Attr, BoxSubscriber, Publisher, Scanned, Subscriber, Subscription};
use crate::sink::{Stop, SynchronousSink, Turn};

pub use self::fused::FusedPath;
pub use self::standard::StandardPath;

mod fused;
mod standard;


/// A publisher that runs every item of `source` through a handler.
///
/// ```
/// # use reactive_handle::{Handle, SynchronousSink};
/// # use reactive_handle::testing::{IterPublisher, TestSubscriber};
/// # use reactive_handle::protocol::Publisher;
/// let doubled_evens = Handle::new(
///     IterPublisher::new(1..=5),
///     |n: &i32, sink: &mut SynchronousSink<i32>| {
///         if n % 2 == 0 {
///             sink.emit(n * 2);
///         }
///         Ok(())
///     },
/// );
/// let subscriber = TestSubscriber::unbounded();
/// doubled_evens.subscribe(Box::new(subscriber.clone()));
/// assert_eq!(subscriber.values(), vec![4, 8]);
/// assert!(subscriber.is_completed());
/// ```
pub struct Handle<P, T, R, F> {
    source: P,
    handler: Arc<F>,
    hooks: Arc<dyn DropHooks>,
    _marker: PhantomData<fn(T) -> R>,
}

impl<P, T, R, F> Handle<P, T, R, F>
    where F: Fn(&T, &mut SynchronousSink<R>) -> Result<(), BoxError> + Send + Sync + 'static,
{
    /// Create a stage that reports dropped signals to the default logging
    /// hooks.
    pub fn new(source: P, handler: F) -> Handle<P, T, R, F> {
        Handle::with_hooks(source, handler, default_hooks())
    }

    /// Create a stage with explicit drop hooks.
    pub fn with_hooks(source: P, handler: F, hooks: Arc<dyn DropHooks>) -> Handle<P, T, R, F> {
        Handle {
            source,
            handler: Arc::new(handler),
            hooks,
            _marker: PhantomData,
        }
    }
}

impl<P, T, R, F> Publisher<R> for Handle<P, T, R, F>
    where P: Publisher<T>,
          T: Debug + Send + 'static,
          R: Send + 'static,
          F: Fn(&T, &mut SynchronousSink<R>) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: BoxSubscriber<R>) {
        let path = HandleSubscriber::new(subscriber, self.handler.clone(), self.hooks.clone());
        trace!(fused = path.is_fused(), "subscribing handle stage");
        self.source.subscribe(Box::new(path));
    }
}


/// Fluent construction of a handle stage on any publisher.
pub trait PublisherExt<T>: Publisher<T> + Sized {
    /// See `Handle::new`.
    fn handle<R, F>(self, handler: F) -> Handle<Self, T, R, F>
        where F: Fn(&T, &mut SynchronousSink<R>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Handle::new(self, handler)
    }
}

impl<T, P: Publisher<T>> PublisherExt<T> for P {}


/// The signal path chosen for one subscription.
pub enum HandleSubscriber<T, R, F> {
    /// Downstream only understands `on_next`.
    Standard(StandardPath<T, R, F>),
    /// Downstream accepts `try_on_next`.
    Fused(FusedPath<T, R, F>),
}

impl<T, R, F> HandleSubscriber<T, R, F>
    where T: Debug,
          F: Fn(&T, &mut SynchronousSink<R>) -> Result<(), BoxError>,
{
    /// Pick the path matching the capability of `downstream`.
    pub fn new(downstream: BoxSubscriber<R>, handler: Arc<F>, hooks: Arc<dyn DropHooks>)
        -> HandleSubscriber<T, R, F>
    {
        let core = PathCore::new(handler, hooks);
        if downstream.is_conditional() {
            HandleSubscriber::Fused(FusedPath::new(downstream, core))
        } else {
            HandleSubscriber::Standard(StandardPath::new(downstream, core))
        }
    }

    /// Whether the fused path was selected.
    pub fn is_fused(&self) -> bool {
        matches!(self, HandleSubscriber::Fused(_))
    }
}

impl<T, R, F> Subscriber<T> for HandleSubscriber<T, R, F>
    where T: Debug,
          F: Fn(&T, &mut SynchronousSink<R>) -> Result<(), BoxError>,
{
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        match self {
            HandleSubscriber::Standard(path) => path.on_subscribe(subscription),
            HandleSubscriber::Fused(path) => path.on_subscribe(subscription),
        }
    }

    fn on_next(&mut self, item: T) {
        match self {
            HandleSubscriber::Standard(path) => path.on_next(item),
            HandleSubscriber::Fused(path) => path.on_next(item),
        }
    }

    fn on_error(&mut self, error: StreamError) {
        match self {
            HandleSubscriber::Standard(path) => path.on_error(error),
            HandleSubscriber::Fused(path) => path.on_error(error),
        }
    }

    fn on_complete(&mut self) {
        match self {
            HandleSubscriber::Standard(path) => path.on_complete(),
            HandleSubscriber::Fused(path) => path.on_complete(),
        }
    }

    fn is_conditional(&self) -> bool {
        match self {
            HandleSubscriber::Standard(path) => path.is_conditional(),
            HandleSubscriber::Fused(path) => path.is_conditional(),
        }
    }

    fn try_on_next(&mut self, item: T) -> bool {
        match self {
            HandleSubscriber::Standard(path) => path.try_on_next(item),
            HandleSubscriber::Fused(path) => path.try_on_next(item),
        }
    }
}


/// The subscription the downstream subscriber holds.
///
/// `request` and `cancel` go straight to upstream. The terminated flag and
/// recorded error are only written from the data path and are kept here so
/// that `scan` can read them from any thread.
pub struct HandleSubscription {
    upstream: OnceLock<Arc<dyn Subscription>>,
    terminated: AtomicBool,
    error: Mutex<Option<StreamError>>,
}

impl HandleSubscription {
    fn new() -> HandleSubscription {
        HandleSubscription {
            upstream: OnceLock::new(),
            terminated: AtomicBool::new(false),
            error: Mutex::new(None),
        }
    }
}

impl Subscription for HandleSubscription {
    fn request(&self, n: u64) {
        if let Some(upstream) = self.upstream.get() {
            upstream.request(n);
        }
    }

    fn cancel(&self) {
        if let Some(upstream) = self.upstream.get() {
            upstream.cancel();
        }
    }

    fn scan(&self, attr: Attr) -> Option<Scanned> {
        match attr {
            Attr::Parent => self.upstream.get().cloned().map(Scanned::Parent),
            Attr::Terminated => Some(Scanned::Terminated(self.terminated.load(Ordering::Acquire))),
            Attr::Error => self.error.lock().clone().map(Scanned::Error),
        }
    }
}


/// State and behaviour common to both signal paths.
pub(crate) struct PathCore<T, R, F> {
    handler: Arc<F>,
    hooks: Arc<dyn DropHooks>,
    subscription: Arc<HandleSubscription>,
    sink: SynchronousSink<R>,
    _item: PhantomData<fn(&T)>,
}

impl<T, R, F> PathCore<T, R, F>
    where T: Debug,
          F: Fn(&T, &mut SynchronousSink<R>) -> Result<(), BoxError>,
{
    fn new(handler: Arc<F>, hooks: Arc<dyn DropHooks>) -> PathCore<T, R, F> {
        PathCore {
            handler,
            hooks,
            subscription: Arc::new(HandleSubscription::new()),
            sink: SynchronousSink::new(),
            _item: PhantomData,
        }
    }

    /// Store the upstream subscription and hand ours to `downstream`.
    ///
    /// A second subscription is cancelled and reported; the first one stays
    /// in place.
    fn subscribe(&self, upstream: Arc<dyn Subscription>, downstream: &mut BoxSubscriber<R>) {
        match self.subscription.upstream.set(upstream) {
            Ok(()) => downstream.on_subscribe(self.subscription.clone()),
            Err(duplicate) => {
                warn!("handle stage received a second subscription");
                duplicate.cancel();
                self.hooks.on_error_dropped(StreamError::DuplicateSubscription);
            }
        }
    }

    fn is_terminated(&self) -> bool {
        self.subscription.terminated.load(Ordering::Acquire)
    }

    /// Route `item` to the drop hook if the stage has already terminated.
    fn dropped(&self, item: &T) -> bool {
        if self.is_terminated() {
            self.hooks.on_next_dropped(item);
            true
        } else {
            false
        }
    }

    /// Run the handler on `item` and collect what it produced.
    ///
    /// The slot starts empty even if the previous handler call unwound after
    /// emitting. A handler error cancels upstream; the caller delivers the
    /// returned error.
    fn run(&mut self, item: &T) -> Result<Turn<R>, StreamError> {
        self.sink.clear();
        match (self.handler)(item, &mut self.sink) {
            Ok(()) => Ok(self.sink.take_turn()),
            Err(err) => {
                self.sink.clear();
                self.subscription.cancel();
                Err(StreamError::handler(err, item))
            }
        }
    }

    fn request_one(&self) {
        self.subscription.request(1);
    }

    /// The standard `on_next` sequence, shared by both paths.
    fn next(&mut self, item: T, downstream: &mut BoxSubscriber<R>) {
        if self.dropped(&item) {
            return;
        }
        let turn = match self.run(&item) {
            Ok(turn) => turn,
            Err(err) => return self.error(err, downstream),
        };
        let emitted = turn.value.is_some();
        if let Some(value) = turn.value {
            downstream.on_next(value);
        }
        match turn.stop {
            Some(stop) => self.stop(stop, &item, downstream),
            None if !emitted => self.request_one(),
            None => {}
        }
    }

    /// Cancel upstream and deliver the terminal signal the handler asked for.
    fn stop(&self, stop: Stop, item: &T, downstream: &mut BoxSubscriber<R>) {
        self.subscription.cancel();
        match stop {
            Stop::Error(err) => self.error(StreamError::signalled(err, item), downstream),
            Stop::Complete => self.complete(downstream),
        }
    }

    fn error(&self, error: StreamError, downstream: &mut BoxSubscriber<R>) {
        if self.subscription.terminated.swap(true, Ordering::AcqRel) {
            self.hooks.on_error_dropped(error);
            return;
        }
        debug!(label = error.as_label(), %error, "handle stage terminated with error");
        *self.subscription.error.lock() = Some(error.clone());
        downstream.on_error(error);
    }

    fn complete(&self, downstream: &mut BoxSubscriber<R>) {
        if self.subscription.terminated.swap(true, Ordering::AcqRel) {
            trace!("completion after termination ignored");
            return;
        }
        debug!("handle stage completed");
        downstream.on_complete();
    }
}
