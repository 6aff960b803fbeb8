//! The per-item emission surface handed to handlers.

use crate::error::BoxError;


/// Emission slot for one handler invocation.
///
/// A handler may emit at most one value per input item, and may additionally
/// end the stream with `complete` or `error`. Emitting a value and ending the
/// stream in the same invocation means "deliver this value, then terminate".
///
/// ```
/// # use reactive_handle::SynchronousSink;
/// fn halve_even(n: &i32, sink: &mut SynchronousSink<i32>) {
///     if n % 2 == 0 {
///         sink.emit(n / 2);
///     }
/// }
/// ```
pub struct SynchronousSink<R> {
    value: Option<R>,
    stop: Option<Stop>,
}

/// How the handler asked the stream to end.
pub(crate) enum Stop {
    Complete,
    Error(BoxError),
}

/// Everything one handler invocation produced.
pub(crate) struct Turn<R> {
    pub value: Option<R>,
    pub stop: Option<Stop>,
}

impl<R> SynchronousSink<R> {
    pub(crate) fn new() -> SynchronousSink<R> {
        SynchronousSink { value: None, stop: None }
    }

    /// Emit the value for the current item.
    ///
    /// # Panics
    ///
    /// Panics if a value has already been emitted for this item. This is a
    /// bug in the handler and is never turned into a stream error.
    pub fn emit(&mut self, value: R) {
        assert!(self.value.is_none(), "cannot emit more than one value per item");
        self.value = Some(value);
    }

    /// End the stream successfully after the current item.
    ///
    /// Has no effect if `error` was already called for this item.
    pub fn complete(&mut self) {
        if self.stop.is_none() {
            self.stop = Some(Stop::Complete);
        }
    }

    /// End the stream with an error after the current item. Takes precedence
    /// over `complete`, whichever is called first.
    pub fn error<E: Into<BoxError>>(&mut self, error: E) {
        self.stop = Some(Stop::Error(error.into()));
    }

    /// Move out the result of the current item and reset for the next one.
    pub(crate) fn take_turn(&mut self) -> Turn<R> {
        Turn {
            value: self.value.take(),
            stop: self.stop.take(),
        }
    }

    /// Discard whatever the current item produced.
    pub(crate) fn clear(&mut self) {
        self.value = None;
        self.stop = None;
    }
}
