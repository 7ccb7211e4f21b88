use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio_util::sync::CancellationToken;

/// Capability to stop a running job.
///
/// Cancellation is cooperative: `dispose` only signals. Work that never
/// reaches an await point (or never checks its token) keeps running until it
/// returns on its own.
pub trait CancellationHandle: Send + Sync {
    /// Whether the work has stopped, either because it finished or because
    /// `dispose` was called.
    fn is_disposed(&self) -> bool;

    /// Requests cancellation. Calling it again is a no-op.
    fn dispose(&self);
}

/// Handle given to the registry by `JobRunner`.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    token: CancellationToken,
    finished: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn new(token: CancellationToken) -> Self {
        TaskHandle {
            token,
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}

impl CancellationHandle for TaskHandle {
    fn is_disposed(&self) -> bool {
        self.token.is_cancelled() || self.finished.load(Ordering::SeqCst)
    }

    fn dispose(&self) {
        self.token.cancel();
    }
}
