//! A transform/filter stage for push-based, backpressure-controlled streams
//!
//! *reactive-handle* implements the `handle` operator of a reactive-streams
//! pipeline: a stage sitting between a `Publisher` and a `Subscriber` that
//! runs every item through a user supplied handler. The handler receives the
//! item and a `SynchronousSink`, into which it may emit at most one value. It
//! may also end the stream early, successfully or with an error.
//!
//! Handlers that neither emit nor end the stream filter the item out. Since
//! the downstream already paid for that item with its demand, the stage keeps
//! the demand accounting balanced by itself, in one of two ways:
//!
//! - If the downstream subscriber is plain, the stage asks upstream for one
//!   more item (`request(1)`).
//! - If the downstream subscriber is *conditional*, i.e. it accepts items
//!   through `try_on_next` and reports whether it kept them, the stage simply
//!   reports the filtered item as not consumed. Upstream then offers the next
//!   item straight away. This is the fused path.
//!
//!
//! # Example
//!
//! ```
//! # // NOTE: If you change this example, please update the README.md
//! # // accordingly, so that they remain in sync!
//! use reactive_handle::{PublisherExt, SynchronousSink};
//! use reactive_handle::protocol::Publisher;
//! use reactive_handle::testing::{IterPublisher, TestSubscriber};
//!
//! // Double the even numbers, drop the odd ones, stop after 4
//! let stage = IterPublisher::new(1..=10).handle(|n: &i32, sink: &mut SynchronousSink<i32>| {
//!     if n % 2 == 0 {
//!         sink.emit(n * 2);
//!     }
//!     if *n == 4 {
//!         sink.complete();
//!     }
//!     Ok(())
//! });
//!
//! let subscriber = TestSubscriber::unbounded();
//! stage.subscribe(Box::new(subscriber.clone()));
//! assert_eq!(subscriber.values(), vec![4, 8]);
//! assert!(subscriber.is_completed());
//! ```
//!
//!
//! # Errors
//!
//! There are two kinds of failure, and they are kept strictly apart:
//!
//! - Stream errors (`StreamError`) travel downstream through `on_error`. A
//!   handler produces one either by returning `Err` or by calling
//!   `sink.error(..)`. Either way the upstream subscription is cancelled and
//!   the error names the item that caused it.
//! - Handler bugs, such as emitting twice for one item, panic. They are never
//!   converted into stream errors.
//!
//! Signals arriving after the stage terminated are handed to `DropHooks`. By
//! default they are logged through `tracing`.

#![warn(missing_docs)]

pub use crate::error::{BoxError, StreamError};
pub use crate::handle::{Handle, HandleSubscriber, PublisherExt};
pub use crate::hooks::{default_hooks, DropHooks, LogDropHooks};
pub use crate::sink::SynchronousSink;

pub mod protocol;
pub mod testing;
mod error;
mod handle;
mod hooks;
mod sink;
