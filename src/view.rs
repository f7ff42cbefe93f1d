//! Guard against applying results to a view that has gone away.
//!
//! A screen creates a [`ViewScope`] when it mounts and closes it when it
//! unmounts. Work started through [`ViewScope::run`] resolves to `None` once
//! the scope is closed, so completions arriving late are dropped instead of
//! being applied.

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Lifetime of one mounted view.
#[derive(Debug, Clone, Default)]
pub struct ViewScope {
    token: CancellationToken,
}

impl ViewScope {
    /// Open a new scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope closed together with this one (or earlier, on its own).
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Whether the view is still mounted.
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Mark the view as gone.
    pub fn close(&self) {
        self.token.cancel();
    }

    /// Drive `future` while the view is mounted.
    ///
    /// Returns `None` if the scope was closed before the future completed,
    /// or if it completed but the scope closed in the meantime.
    pub async fn run<F>(&self, future: F) -> Option<F::Output>
    where
        F: Future,
    {
        let output = tokio::select! {
            biased;
            () = self.token.cancelled() => None,
            output = future => Some(output),
        };
        output.filter(|_| self.is_active())
    }

    /// Spawn `future` on the runtime, dropping its result if the scope closes.
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let scope = self.clone();
        tokio::spawn(async move { scope.run(future).await })
    }
}
