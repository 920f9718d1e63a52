//! In-memory event bus for tests/dev.

use core::convert::Infallible;

use tokio::sync::broadcast;

use crate::bus::{EventBus, Subscription};

const DEFAULT_CAPACITY: usize = 1024;

/// In-memory broadcast bus.
///
/// - No IO
/// - Best-effort fan-out (slow subscribers lag instead of blocking publishers)
/// - Publishing with no subscribers is not an error
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    sender: broadcast::Sender<M>,
}

impl<M: Clone> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<M: Clone> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = Infallible;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        // `send` only fails when nobody is listening.
        let _ = self.sender.send(message);
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        Subscription::new(self.sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{RecvError, TryRecvError};

    #[tokio::test]
    async fn every_subscriber_receives_each_message() {
        let bus = InMemoryEventBus::<u64>::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(7).unwrap();

        assert_eq!(first.recv().await.unwrap(), 7);
        assert_eq!(second.recv().await.unwrap(), 7);
    }

    #[test]
    fn publish_without_subscribers_is_ok() {
        let bus = InMemoryEventBus::<u64>::new();
        assert!(bus.publish(1).is_ok());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_observes_lag() {
        let bus = InMemoryEventBus::<u64>::with_capacity(2);
        let mut sub = bus.subscribe();
        for n in 0..5 {
            bus.publish(n).unwrap();
        }

        match sub.recv().await {
            Err(RecvError::Lagged(skipped)) => assert!(skipped > 0),
            other => panic!("expected lag, got {other:?}"),
        }
        assert!(sub.try_recv().is_ok());
        while sub.try_recv().is_ok() {}
        assert!(matches!(sub.try_recv(), Err(TryRecvError::Empty)));
    }
}
