//! Correlation of asynchronous results to the callers awaiting them.
//!
//! Some requests handled by central can only be resolved out-of-band: the
//! answer is produced later, by a component that has no reference to the
//! request handler -- e.g. a scan performed by a delegated cluster whose
//! result arrives on an unrelated connection. This crate bridges the two
//! sides with an opaque correlation id:
//!
//! - A consumer obtains a [`Waiter`] from the [`Manager`], publishes the
//!   waiter's id alongside the outbound work item, and awaits
//!   [`Waiter::wait`].
//! - Whatever component later observes the resolution calls
//!   [`Manager::send`] with that id and the result. It needs no reference
//!   to any waiter.
//!
//! ```text
//! [ consumer ] -> new_waiter() -> [ Manager ] <- send(id, value) <- [ producer ]
//!       \                              |
//!        `--------- wait() <---- dispatch task
//! ```
//!
//! All deliveries funnel through a single dispatch task, which is the only
//! place registry entries are removed. That task `select!`s delivery,
//! abandonment cleanup, and the shutdown token in one place, so a `send`
//! racing shutdown observes exactly one of the two outcomes. Delivery is
//! per-id exactly-once; there is no ordering across distinct ids.
//!
//! A waiter that stops waiting -- dropped, [`Waiter::close`]d, or timed
//! out by the caller's own combinator -- hands its id back to the dispatch
//! task for reclamation. A `send` for an id with no live waiter is
//! silently discarded: producers are not expected to know whether anyone
//! is still listening.
//!
//! This is an in-memory primitive. A process restart loses all pending
//! waiters; resuming them is the responsibility of the systems that
//! published the ids.
//!
//! # Example
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), palisade_waiter::Error> {
//! use tokio_util::sync::CancellationToken;
//!
//! let manager = palisade_waiter::Manager::<String>::new();
//! manager.start(CancellationToken::new());
//!
//! let waiter = manager.new_waiter()?;
//! let id = waiter.id().to_string();
//!
//! let producer = manager.clone();
//! tokio::spawn(async move { producer.send(id, "hello".to_string()).await });
//!
//! assert_eq!(waiter.wait().await?, "hello");
//! # Ok(())
//! # }
//! ```

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod id;
mod manager;
mod waiter;


pub use self::{
    id::{IdGen, UuidGen},
    manager::{Builder, Manager},
    waiter::Waiter,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The id generator produced a colliding id on every attempt while
    /// registering a new waiter. Retry later or widen the id space.
    #[error("exhausted retries generating a unique waiter id")]
    TooManyCollisions,

    /// The manager's shutdown token was cancelled before this operation.
    #[error("waiter manager has shut down")]
    ManagerShutdown,

    /// The manager shut down while this waiter was still pending.
    #[error("waiter closed before a result was delivered")]
    WaiterClosed,

    /// A custom id generator failed.
    #[error("failed to generate a waiter id: {0}")]
    GenerateId(#[source] anyhow::Error),
}
