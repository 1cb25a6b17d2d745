use std::future::Future;

use tokio::sync::Mutex;

/// Process-wide gate around the generate-validate cycle.
///
/// Built once at startup and shared by `Arc`. Only one cycle runs at a time;
/// other callers wait their turn. Not reentrant: calling [`GenerationGate::run`]
/// from inside a gated future deadlocks.
#[derive(Debug, Default)]
pub struct GenerationGate {
    lock: Mutex<()>,
}

impl GenerationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` while holding the gate. The guard is dropped on every exit
    /// path, including errors and cancellation of the caller.
    pub async fn run<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.lock.lock().await;
        fut.await
    }

    /// True when a cycle is in progress.
    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}
