use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::errors::CoreError;

/// Completion and cancellation flags of one run-level operation
#[derive(Debug, Default)]
pub(crate) struct Progress {
    cancelled: AtomicBool,
    done: AtomicBool,
}

impl Progress {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Request cancellation; false once the operation has finished
    pub(crate) fn cancel(&self) -> bool {
        if self.done.load(Ordering::SeqCst) {
            return false;
        }
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn finish(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

fn cancelled(target: i32) -> CoreError {
    CoreError::Cancelled {
        message: format!("proceeding to run level {} was cancelled", target),
    }
}

/// Pending result of an asynchronous run-level transition
///
/// Resolves to the level the controller settled on. Await it from async code;
/// [`wait`](Self::wait) blocks and must not be called on a runtime thread.
pub struct RunLevelFuture {
    target: i32,
    progress: Arc<Progress>,
    receiver: oneshot::Receiver<Result<i32, CoreError>>,
}

impl RunLevelFuture {
    pub(crate) fn new(
        target: i32,
        progress: Arc<Progress>,
        receiver: oneshot::Receiver<Result<i32, CoreError>>,
    ) -> Self {
        Self {
            target,
            progress,
            receiver,
        }
    }

    /// Level this transition is heading for
    pub fn target(&self) -> i32 {
        self.target
    }

    /// Cancel the transition; the partially activated level is unwound
    pub fn cancel(&self) -> bool {
        self.progress.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.progress.is_cancelled()
    }

    /// Finished, either by completing or by being cancelled
    pub fn is_done(&self) -> bool {
        self.progress.is_done() || self.progress.is_cancelled()
    }

    /// Block until the transition finishes
    pub fn wait(self) -> Result<i32, CoreError> {
        if self.progress.is_cancelled() {
            return Err(cancelled(self.target));
        }
        let target = self.target;
        self.receiver.blocking_recv().unwrap_or_else(|_| {
            Err(CoreError::illegal_state(format!(
                "the transition to run level {} was abandoned",
                target
            )))
        })
    }
}

impl Future for RunLevelFuture {
    type Output = Result<i32, CoreError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.progress.is_cancelled() {
            return Poll::Ready(Err(cancelled(self.target)));
        }
        let target = self.target;
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(CoreError::illegal_state(format!(
                "the transition to run level {} was abandoned",
                target
            )))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for RunLevelFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLevelFuture")
            .field("target", &self.target)
            .field("done", &self.progress.is_done())
            .field("cancelled", &self.progress.is_cancelled())
            .finish()
    }
}
