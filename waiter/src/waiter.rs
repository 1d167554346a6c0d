use crate::Error;
use std::fmt;
use tokio::sync::{mpsc, oneshot};

/// One pending, in-flight wait bound to a single correlation id.
///
/// Obtained from [`Manager::new_waiter`]; resolved by a matching
/// [`Manager::send`]. A waiter that stops waiting hands its id back to
/// the dispatch task: dropping the handle, [`close`]-ing it, and
/// abandoning the [`wait`] future (e.g. under `tokio::time::timeout`)
/// are all equivalent. Because `wait` and `close` consume the handle,
/// giving up can only happen once.
///
/// [`Manager::new_waiter`]: crate::Manager::new_waiter
/// [`Manager::send`]: crate::Manager::send
/// [`close`]: Waiter::close
/// [`wait`]: Waiter::wait
pub struct Waiter<T> {
    id: String,
    rx: oneshot::Receiver<T>,
    gave_up: mpsc::UnboundedSender<String>,
    resolved: bool,
}

impl<T> Waiter<T> {
    pub(crate) fn new(
        id: String,
        rx: oneshot::Receiver<T>,
        gave_up: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            id,
            rx,
            gave_up,
            resolved: false,
        }
    }

    /// The correlation id to publish to whatever system will eventually
    /// resolve this waiter. Stable for the waiter's lifetime.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Blocks until the result for this waiter's id is delivered,
    /// returning it exactly as it was passed to `send`.
    ///
    /// Resolves [`Error::WaiterClosed`] if the manager shuts down first.
    /// Nothing is retried internally: a failed wait is final for this id,
    /// and callers needing another attempt must register a new waiter and
    /// re-publish its id. Caller-side deadlines compose around the
    /// returned future; dropping it reclaims the registration.
    pub async fn wait(mut self) -> Result<T, Error> {
        let received = (&mut self.rx).await;
        self.resolved = true;
        match received {
            Ok(value) => Ok(value),
            Err(_) => Err(Error::WaiterClosed),
        }
    }

    /// Gives up waiting and releases the registration.
    pub fn close(self) {}
}

impl<T> Drop for Waiter<T> {
    fn drop(&mut self) {
        if !self.resolved {
            // Best-effort: if the dispatch task is gone, the registry
            // went with it.
            let _ = self.gave_up.send(std::mem::take(&mut self.id));
        }
    }
}

impl<T> fmt::Debug for Waiter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("id", &self.id)
            .field("resolved", &self.resolved)
            .finish()
    }
}
