//! Stream-level errors.
//!
//! Everything in this module travels through `Subscriber::on_error`.
//! Programming errors (such as emitting twice from one handler invocation)
//! are not represented here; they panic.

use std::fmt::Debug;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error accepted from handlers and `SynchronousSink::error`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared error source, so that `StreamError` stays cheap to clone.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// An error delivered through the signal protocol.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum StreamError {
    /// The handler returned an error while processing `item`.
    #[error("handler failed on item {item}: {source}")]
    Handler {
        /// `Debug` rendering of the item being processed.
        item: String,
        /// The error returned by the handler.
        source: SharedError,
    },

    /// The handler deliberately signalled an error through its sink.
    #[error("handler signalled an error on item {item}: {source}")]
    Signalled {
        /// `Debug` rendering of the item being processed.
        item: String,
        /// The error passed to the sink.
        source: SharedError,
    },

    /// An error raised further upstream and passed through unchanged.
    #[error(transparent)]
    Upstream(SharedError),

    /// `on_subscribe` was called on a subscriber that already holds a
    /// subscription.
    #[error("subscription already set")]
    DuplicateSubscription,
}

impl StreamError {
    /// Wrap an error originating in a source.
    pub fn upstream<E: Into<BoxError>>(error: E) -> StreamError {
        StreamError::Upstream(Arc::from(error.into()))
    }

    pub(crate) fn handler<T: Debug>(error: BoxError, item: &T) -> StreamError {
        StreamError::Handler {
            item: format!("{:?}", item),
            source: Arc::from(error),
        }
    }

    pub(crate) fn signalled<T: Debug>(error: BoxError, item: &T) -> StreamError {
        StreamError::Signalled {
            item: format!("{:?}", item),
            source: Arc::from(error),
        }
    }

    /// The item that was being processed when the error occurred, if the
    /// error was raised by an operator.
    pub fn item(&self) -> Option<&str> {
        match self {
            StreamError::Handler { item, .. } | StreamError::Signalled { item, .. } => Some(item),
            _ => None,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// ```
    /// use reactive_handle::StreamError;
    ///
    /// assert_eq!(StreamError::upstream("boom").as_label(), "upstream");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            StreamError::Handler { .. } => "handler_failed",
            StreamError::Signalled { .. } => "handler_signalled",
            StreamError::Upstream(_) => "upstream",
            StreamError::DuplicateSubscription => "duplicate_subscription",
        }
    }
}
