use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cloneable abort signal shared between a controller and workers.
///
/// The controller calls [`cancel`](Self::cancel); workers poll
/// [`is_cancelled`](Self::is_cancelled) between units of work. Once set the
/// flag stays set.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl From<Arc<AtomicBool>> for CancelFlag {
    fn from(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }
}
