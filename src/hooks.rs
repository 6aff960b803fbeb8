//! Reporting of signals that arrive after termination.

use std::fmt::Debug;
use std::sync::Arc;

use lazy_static::lazy_static;
use tracing::{debug, warn};

use crate::error::StreamError;


/// Receives signals a terminated stage can no longer deliver.
pub trait DropHooks: Send + Sync {
    /// An item arrived after the stage terminated.
    fn on_next_dropped(&self, item: &dyn Debug);

    /// An error arrived after the stage terminated, or a protocol violation
    /// was detected that has no downstream to go to.
    fn on_error_dropped(&self, error: StreamError);
}

/// Drop hooks that log through `tracing`.
#[derive(Default, Clone, Copy, Debug)]
pub struct LogDropHooks;

impl DropHooks for LogDropHooks {
    fn on_next_dropped(&self, item: &dyn Debug) {
        debug!(?item, "item dropped after termination");
    }

    fn on_error_dropped(&self, error: StreamError) {
        warn!(label = error.as_label(), %error, "error dropped after termination");
    }
}


lazy_static! {
    static ref DEFAULT_HOOKS: Arc<dyn DropHooks> = Arc::new(LogDropHooks);
}

/// The process-wide logging hooks used when a stage is built without
/// explicit hooks.
pub fn default_hooks() -> Arc<dyn DropHooks> {
    DEFAULT_HOOKS.clone()
}
