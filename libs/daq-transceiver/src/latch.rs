use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation signal shared across every thread of one
/// worker. Every blocking wait point polls this at an interval of at
/// most 100ms, the sync-thread analogue of an async cancellation token.
#[derive(Clone, Default)]
pub struct ExitLatch(Arc<AtomicBool>);

impl ExitLatch {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn trip(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
