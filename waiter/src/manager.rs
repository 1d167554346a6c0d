use crate::{
    id::{IdGen, UuidGen},
    waiter::Waiter,
    Error,
};
use parking_lot::Mutex;
use std::{
    collections::{hash_map::Entry, HashMap},
    fmt,
    marker::PhantomData,
    sync::Arc,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// How many times `new_waiter` re-rolls a colliding id before giving up.
const DEFAULT_MAX_COLLISIONS: usize = 5;

/// Routes results published by id to the waiters registered for them.
///
/// Cheap to clone; all clones share one registry and one dispatch task.
/// Build one manager per payload type at startup, [`start`] it with a
/// token tied to the process lifetime, and hand clones to both the
/// request-handling side ([`new_waiter`]) and the resolving side
/// ([`send`]).
///
/// [`start`]: Manager::start
/// [`new_waiter`]: Manager::new_waiter
/// [`send`]: Manager::send
pub struct Manager<T> {
    shared: Arc<Shared<T>>,
    response_tx: mpsc::Sender<Response<T>>,
    gave_up_tx: mpsc::UnboundedSender<String>,
}

/// Configures a [`Manager`] before construction.
pub struct Builder<T> {
    id_gen: Box<dyn IdGen>,
    max_collisions: usize,
    _payload: PhantomData<fn() -> T>,
}

/// A result in flight from a producer to the dispatch task.
struct Response<T> {
    id: String,
    value: T,
}

struct Shared<T> {
    registry: Mutex<Registry<T>>,
    id_gen: Box<dyn IdGen>,
    max_collisions: usize,
    /// Receiving ends of the response and gave-up channels, handed to the
    /// dispatch task exactly once by `start`.
    inbox: Mutex<Option<Inbox<T>>>,
}

/// Live waiters by id. An id is present here iff a waiter for it exists
/// that has not been delivered to, dropped, or cut off by shutdown.
///
/// The shutdown flag shares this lock so that it flips in the same
/// critical section that drains the map: a waiter can never register into
/// an already-drained registry.
struct Registry<T> {
    waiters: HashMap<String, oneshot::Sender<T>>,
    shut_down: bool,
}

struct Inbox<T> {
    response_rx: mpsc::Receiver<Response<T>>,
    gave_up_rx: mpsc::UnboundedReceiver<String>,
}

// === impl Builder ===

impl<T: Send + 'static> Builder<T> {
    /// Replaces the default UUID id generator.
    pub fn id_gen(mut self, id_gen: impl IdGen + 'static) -> Self {
        self.id_gen = Box::new(id_gen);
        self
    }

    /// Overrides the collision budget for `new_waiter`. Zero keeps the
    /// default of 5.
    pub fn max_collisions(mut self, n: usize) -> Self {
        if n > 0 {
            self.max_collisions = n;
        }
        self
    }

    pub fn build(self) -> Manager<T> {
        // Capacity 1 is tokio's closest analog to a rendezvous handoff:
        // producers stall until the dispatch task keeps up, and the
        // channel's closure on task exit is what `send` observes as
        // shutdown.
        let (response_tx, response_rx) = mpsc::channel(1);
        let (gave_up_tx, gave_up_rx) = mpsc::unbounded_channel();
        Manager {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry {
                    waiters: HashMap::new(),
                    shut_down: false,
                }),
                id_gen: self.id_gen,
                max_collisions: self.max_collisions,
                inbox: Mutex::new(Some(Inbox {
                    response_rx,
                    gave_up_rx,
                })),
            }),
            response_tx,
            gave_up_tx,
        }
    }
}

// === impl Manager ===

impl<T: Send + 'static> Manager<T> {
    /// A manager with the default id generator and collision budget.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> Builder<T> {
        Builder {
            id_gen: Box::new(UuidGen),
            max_collisions: DEFAULT_MAX_COLLISIONS,
            _payload: PhantomData,
        }
    }

    /// Spawns the dispatch task, which runs until `shutdown` is
    /// cancelled. Cancellation is final: every pending waiter resolves
    /// [`Error::WaiterClosed`] and all later `send`/`new_waiter` calls
    /// fail with [`Error::ManagerShutdown`].
    ///
    /// `new_waiter` and `send` may be called before `start`; they queue
    /// against the same channels and are serviced once the task runs.
    ///
    /// # Panics
    ///
    /// Panics if called a second time.
    pub fn start(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let inbox = self
            .shared
            .inbox
            .lock()
            .take()
            .expect("waiter manager started twice");
        tokio::spawn(dispatch(self.shared.clone(), inbox, shutdown))
    }

    /// Registers a waiter under a freshly generated id.
    ///
    /// Ids colliding with a live registration are re-rolled up to the
    /// configured budget; exhausting it returns
    /// [`Error::TooManyCollisions`], which callers should treat as
    /// retry-later.
    pub fn new_waiter(&self) -> Result<Waiter<T>, Error> {
        let mut registry = self.shared.registry.lock();
        if registry.shut_down {
            return Err(Error::ManagerShutdown);
        }

        for _ in 0..self.shared.max_collisions {
            let id = self.shared.id_gen.gen_id().map_err(Error::GenerateId)?;
            match registry.waiters.entry(id) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(entry) => {
                    let id = entry.key().clone();
                    let (tx, rx) = oneshot::channel();
                    entry.insert(tx);
                    return Ok(Waiter::new(id, rx, self.gave_up_tx.clone()));
                }
            }
        }

        Err(Error::TooManyCollisions)
    }

    /// Delivers `value` to the waiter registered under `id`.
    ///
    /// This is a handoff to the dispatch task, not a direct write to the
    /// waiter: the task arbitrates delivery against shutdown in a single
    /// `select!`. If no waiter holds `id` -- it was never issued, already
    /// resolved, or gave up -- the value is discarded and `Ok(())` is
    /// still returned. Producers are not told whether anyone was
    /// listening.
    pub async fn send(&self, id: impl Into<String>, value: T) -> Result<(), Error> {
        if self.shared.registry.lock().shut_down {
            return Err(Error::ManagerShutdown);
        }

        let response = Response {
            id: id.into(),
            value,
        };
        self.response_tx
            .send(response)
            .await
            .map_err(|_| Error::ManagerShutdown)
    }

    /// Number of waiters currently registered.
    pub fn pending(&self) -> usize {
        self.shared.registry.lock().waiters.len()
    }
}

impl<T: Send + 'static> Default for Manager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Manager<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            response_tx: self.response_tx.clone(),
            gave_up_tx: self.gave_up_tx.clone(),
        }
    }
}

// NB: the id generator does not have a `Debug` impl.
impl<T> fmt::Debug for Manager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.shared.registry.lock();
        f.debug_struct("Manager")
            .field("pending", &registry.waiters.len())
            .field("shut_down", &registry.shut_down)
            .finish()
    }
}

// === dispatch ===

/// The single task that owns registry removal.
///
/// Every delivery, abandonment, and the shutdown signal meet in this
/// `select!`, so per-id removal is exactly-once and `send` cannot race
/// shutdown inconsistently.
async fn dispatch<T: Send + 'static>(
    shared: Arc<Shared<T>>,
    mut inbox: Inbox<T>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let mut registry = shared.registry.lock();
                registry.shut_down = true;
                // Dropping the senders closes every pending waiter.
                let drained = registry.waiters.drain().count();
                tracing::debug!(waiters = drained, "Waiter manager shut down");
                return;
            }

            Some(Response { id, value }) = inbox.response_rx.recv() => {
                let tx = shared.registry.lock().waiters.remove(&id);
                match tx {
                    Some(tx) => {
                        if tx.send(value).is_err() {
                            tracing::debug!(%id, "Waiter hung up before delivery");
                        }
                    }
                    None => tracing::debug!(%id, "No waiter registered, dropping response"),
                }
            }

            Some(id) = inbox.gave_up_rx.recv() => {
                // No-op if delivery already raced the abandonment.
                shared.registry.lock().waiters.remove(&id);
            }
        }
    }
}
