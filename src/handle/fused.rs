//! Signal path for conditional downstream subscribers.

use std::fmt::Debug;
use std::sync::Arc;

use super::PathCore;
use crate::error::{BoxError, StreamError};
use crate::protocol::{BoxSubscriber, Subscriber, Subscription};
use crate::sink::SynchronousSink;


/// Forwards handler output with `try_on_next`.
///
/// A filtered item is reported to upstream as not consumed, so upstream
/// offers the next item straight away and no extra `request` is issued.
pub struct FusedPath<T, R, F> {
    downstream: BoxSubscriber<R>,
    core: PathCore<T, R, F>,
}

impl<T, R, F> FusedPath<T, R, F> {
    pub(crate) fn new(downstream: BoxSubscriber<R>, core: PathCore<T, R, F>) -> FusedPath<T, R, F> {
        FusedPath { downstream, core }
    }
}

impl<T, R, F> Subscriber<T> for FusedPath<T, R, F>
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

    fn is_conditional(&self) -> bool { true }

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
        let consumed = match turn.value {
            Some(value) => self.downstream.try_on_next(value),
            None => false,
        };
        if let Some(stop) = turn.stop {
            self.core.stop(stop, &item, &mut self.downstream);
            return true;
        }
        consumed
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
    fn filtered_items_are_not_consumed() {
        let source = TestPublisher::new();
        let subscriber = TestSubscriber::conditional(1, |_| true);
        Handle::new(source.clone(), |n: &i32, sink: &mut SynchronousSink<i32>| {
            if *n > 3 {
                sink.emit(*n);
            }
            Ok(())
        }).subscribe(Box::new(subscriber.clone()));

        let results: Vec<bool> = (1..=4).map(|n| source.try_next(n)).collect();
        assert_eq!(results, vec![false, false, false, true]);
        assert_eq!(source.stats().requests(), vec![1]);
        assert_eq!(subscriber.values(), vec![4]);
    }

    #[test]
    fn downstream_rejection_is_passed_back() {
        let source = TestPublisher::new();
        let subscriber = TestSubscriber::conditional(10, |v: &i32| *v != 20);
        Handle::new(source.clone(), |n: &i32, sink: &mut SynchronousSink<i32>| {
            sink.emit(n * 10);
            Ok(())
        }).subscribe(Box::new(subscriber.clone()));

        assert!(source.try_next(1));
        assert!(!source.try_next(2));
        assert!(source.try_next(3));
        assert_eq!(subscriber.values(), vec![10, 30]);
        assert_eq!(subscriber.rejected(), 1);
    }

    #[test]
    fn plain_on_next_still_replenishes() {
        let source = TestPublisher::new();
        let subscriber = TestSubscriber::conditional(1, |_| true);
        Handle::new(source.clone(), |n: &i32, sink: &mut SynchronousSink<i32>| {
            if *n == 2 {
                sink.emit(*n);
            }
            Ok(())
        }).subscribe(Box::new(subscriber.clone()));

        source.next(1);
        source.next(2);
        assert_eq!(source.stats().requests(), vec![1, 1]);
        assert_eq!(subscriber.values(), vec![2]);
    }

    #[test]
    fn stop_consumes_the_turn() {
        let hooks = Arc::new(CountingHooks::default());
        let source = TestPublisher::new();
        let subscriber = TestSubscriber::conditional(1, |_| false);
        Handle::with_hooks(source.clone(), |_: &i32, sink: &mut SynchronousSink<i32>| {
            sink.complete();
            Ok(())
        }, hooks.clone()).subscribe(Box::new(subscriber.clone()));

        assert!(source.try_next(1));
        assert_eq!(source.stats().cancel_count(), 1);
        assert_eq!(subscriber.completions(), 1);
        assert!(!source.try_next(2));
        assert_eq!(hooks.dropped_items(), vec!["2".to_string()]);
        assert_eq!(subscriber.terminal_count(), 1);
    }
}
