//! Signal path for downstream subscribers that only understand `on_next`.

use std::fmt::Debug;
use std::sync::Arc;

use super::PathCore;
use crate::error::{BoxError, StreamError};
use crate::protocol::{BoxSubscriber, Subscriber, Subscription};
use crate::sink::SynchronousSink;


/// Forwards handler output with `on_next`.
///
/// Every item the handler filters out consumed one unit of the downstream's
/// demand without producing anything, so the path requests one replacement
/// item from upstream.
pub struct StandardPath<T, R, F> {
    downstream: BoxSubscriber<R>,
    core: PathCore<T, R, F>,
}

impl<T, R, F> StandardPath<T, R, F> {
    pub(crate) fn new(downstream: BoxSubscriber<R>, core: PathCore<T, R, F>) -> StandardPath<T, R, F> {
        StandardPath { downstream, core }
    }
}

impl<T, R, F> Subscriber<T> for StandardPath<T, R, F>
    where T: Debug,
          F: Fn(&T, &mut SynchronousSink<R>) -> Result<(), BoxError>,
{
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.core.subscribe(subscription, &mut self.downstream);
    }

    fn on_next(&mut self, item: T) {
        self.core.next(item, &mut self.downstream);
    }

    fn on_error(&mut self, error: StreamError) {
        self.core.error(error, &mut self.downstream);
    }

    fn on_complete(&mut self) {
        self.core.complete(&mut self.downstream);
    }

    /// Called only by upstreams that ignore `is_conditional`. Reports whether
    /// a value reached downstream; never replenishes demand itself.
    fn try_on_next(&mut self, item: T) -> bool {
        if self.core.dropped(&item) {
            return false;
        }
        let turn = match self.core.run(&item) {
            Ok(turn) => turn,
            Err(err) => {
                self.core.error(err, &mut self.downstream);
                return false;
            }
        };
        let emitted = turn.value.is_some();
        if let Some(value) = turn.value {
            self.downstream.on_next(value);
        }
        if let Some(stop) = turn.stop {
            self.core.stop(stop, &item, &mut self.downstream);
            return true;
        }
        emitted
    }
}


#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::handle::Handle;
    use crate::protocol::Publisher;
    use crate::sink::SynchronousSink;
    use crate::testing::{CountingHooks, TestPublisher, TestSubscriber};

    #[test]
    fn filtered_items_request_replacements() {
        let source = TestPublisher::new();
        let subscriber = TestSubscriber::new(1);
        Handle::new(source.clone(), |n: &i32, sink: &mut SynchronousSink<i32>| {
            if *n > 3 {
                sink.emit(*n);
            }
            Ok(())
        }).subscribe(Box::new(subscriber.clone()));

        for n in 1..=4 {
            source.next(n);
        }
        assert_eq!(source.stats().requests(), vec![1, 1, 1, 1]);
        assert_eq!(subscriber.values(), vec![4]);
    }

    #[test]
    fn emitting_items_do_not_request() {
        let source = TestPublisher::new();
        let subscriber = TestSubscriber::new(3);
        Handle::new(source.clone(), |n: &i32, sink: &mut SynchronousSink<String>| {
            sink.emit(n.to_string());
            Ok(())
        }).subscribe(Box::new(subscriber.clone()));

        source.next(1);
        source.next(2);
        assert_eq!(source.stats().requests(), vec![3]);
        assert_eq!(subscriber.values(), vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn try_on_next_reports_forwarding() {
        let source = TestPublisher::new();
        let subscriber = TestSubscriber::unbounded();
        Handle::new(source.clone(), |n: &i32, sink: &mut SynchronousSink<i32>| {
            if n % 2 == 1 {
                sink.emit(*n);
            }
            if *n == 5 {
                sink.complete();
            }
            Ok(())
        }).subscribe(Box::new(subscriber.clone()));

        assert!(source.try_next(1));
        assert!(!source.try_next(2));
        assert!(source.try_next(5));
        assert_eq!(source.stats().requests(), vec![u64::MAX]);
        assert_eq!(source.stats().cancel_count(), 1);
        assert_eq!(subscriber.values(), vec![1, 5]);
        assert_eq!(subscriber.completions(), 1);
    }

    #[test]
    fn items_after_termination_are_dropped() {
        let hooks = Arc::new(CountingHooks::default());
        let source = TestPublisher::new();
        let subscriber = TestSubscriber::unbounded();
        Handle::with_hooks(source.clone(), |n: &i32, sink: &mut SynchronousSink<i32>| {
            sink.emit(*n);
            sink.complete();
            Ok(())
        }, hooks.clone()).subscribe(Box::new(subscriber.clone()));

        source.next(1);
        source.next(2);
        assert!(!source.try_next(3));
        assert_eq!(subscriber.values(), vec![1]);
        assert_eq!(hooks.dropped_items(), vec!["2".to_string(), "3".to_string()]);
    }
}
