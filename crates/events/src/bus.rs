//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes **notifications** that the log has grown. It is not a
//! source of truth: consumers always read the events themselves from the event
//! store, starting at their own checkpoint. A lost or duplicated notification
//! therefore only delays (or repeats) a catch-up; it never loses an event.
//!
//! Delivery is best-effort broadcast. A subscriber that falls behind observes a
//! `Lagged` error and should simply treat it as "something changed".

use std::sync::Arc;

use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// A subscription to a bus.
///
/// Each subscription gets a copy of every message published after it was
/// created.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: broadcast::Receiver<M>,
}

impl<M: Clone> Subscription<M> {
    pub fn new(receiver: broadcast::Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message.
    pub async fn recv(&mut self) -> Result<M, RecvError> {
        self.receiver.recv().await
    }

    /// Try to receive a message without waiting.
    pub fn try_recv(&mut self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Domain-agnostic pub/sub abstraction.
///
/// ```text
/// Append → Event Store (durable) → Event Bus (notify) → Projection workers
///                                                          └─ read log from checkpoint
/// ```
///
/// Events are **stored first**, then announced. If announcing fails the events
/// are still in the store and workers pick them up on their next poll.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
