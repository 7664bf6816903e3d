//! Process-local bus: one unbounded channel per subscriber.

use std::sync::{Mutex, MutexGuard, mpsc};

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InMemoryBusError {
    /// A publisher panicked while holding the subscriber list.
    Poisoned,
    /// [`InMemoryEventBus::close`] was called.
    Closed,
}

#[derive(Debug)]
struct Fanout<M> {
    senders: Vec<mpsc::Sender<M>>,
    closed: bool,
}

/// In-memory broadcast bus.
///
/// Subscribers whose receiving end was dropped are pruned on the next publish.
/// Closing the bus disconnects every subscription, which is how background
/// consumers are told to stop.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    fanout: Mutex<Fanout<M>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    fn fanout(&self) -> Result<MutexGuard<'_, Fanout<M>>, InMemoryBusError> {
        self.fanout.lock().map_err(|_| InMemoryBusError::Poisoned)
    }

    pub fn subscriber_count(&self) -> usize {
        self.fanout().map(|f| f.senders.len()).unwrap_or(0)
    }

    /// Drop every sender. Idempotent.
    pub fn close(&self) {
        if let Ok(mut f) = self.fanout() {
            f.closed = true;
            f.senders.clear();
        }
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            fanout: Mutex::new(Fanout {
                senders: Vec::new(),
                closed: false,
            }),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut f = self.fanout()?;
        if f.closed {
            return Err(InMemoryBusError::Closed);
        }

        f.senders.retain(|tx| tx.send(message.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        // Closed or poisoned: `tx` is dropped here and the subscription reports
        // `Disconnected` straight away.
        if let Ok(mut f) = self.fanout() {
            if !f.closed {
                f.senders.push(tx);
            }
        }

        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::TryRecvError;

    #[test]
    fn every_subscriber_receives_each_message() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(7).unwrap();

        assert_eq!(a.try_recv().unwrap(), 7);
        assert_eq!(b.try_recv().unwrap(), 7);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(1).unwrap();

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.try_recv().unwrap(), 1);
    }

    #[test]
    fn close_disconnects_subscribers_and_refuses_publishes() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let sub = bus.subscribe();
        bus.publish(1).unwrap();

        bus.close();

        assert_eq!(sub.try_recv().unwrap(), 1);
        assert_eq!(sub.try_recv(), Err(TryRecvError::Disconnected));
        assert_eq!(bus.publish(2), Err(InMemoryBusError::Closed));
        assert_eq!(bus.subscribe().try_recv(), Err(TryRecvError::Disconnected));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
