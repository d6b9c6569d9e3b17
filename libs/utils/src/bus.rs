//! Typed publish/subscribe event bus.
//!
//! Every event belongs to exactly one topic. Consumers subscribe to the topics
//! they care about and get an unbounded receiver per subscription; producers
//! publish without knowing who listens. Subscribers that dropped their receiver
//! are removed lazily on the next publish to their topic.
use std::{collections::HashMap, fmt, hash::Hash, sync::Mutex};

use tokio::sync::mpsc;

/// Event which can be routed by the [`Bus`].
pub trait Topical: Clone + Send + 'static {
    /// Topic identifier.
    type Topic: Copy + Eq + Hash + fmt::Debug + Send;
    /// Topic this event belongs to.
    fn topic(&self) -> Self::Topic;
}

/// Receiving end of a subscription.
pub type Subscription<E> = mpsc::UnboundedReceiver<E>;

/// Event bus. Cheap to share behind an `Arc`.
pub struct Bus<E: Topical> {
    subscribers: Mutex<HashMap<E::Topic, Vec<mpsc::UnboundedSender<E>>>>,
}

impl<E: Topical> fmt::Debug for Bus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let topics: Vec<_> = self
            .subscribers
            .lock()
            .map(|s| s.keys().copied().collect())
            .unwrap_or_default();
        f.debug_struct("Bus").field("topics", &topics).finish()
    }
}

impl<E: Topical> Default for Bus<E> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::default(),
        }
    }
}

impl<E: Topical> Bus<E> {
    /// Creates a bus without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a topic.
    pub fn subscribe(&self, topic: E::Topic) -> Subscription<E> {
        let (send, recv) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(topic)
            .or_default()
            .push(send);
        recv
    }

    /// Publishes an event to all the subscribers of its topic.
    /// Returns the number of subscribers which received the event.
    pub fn publish(&self, event: E) -> usize {
        let topic = event.topic();
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(senders) = subscribers.get_mut(&topic) else {
            tracing::trace!(?topic, "no subscribers");
            return 0;
        };
        senders.retain(|s| s.send(event.clone()).is_ok());
        senders.len()
    }

    /// Number of live subscribers of a topic.
    pub fn subscribers(&self, topic: E::Topic) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&topic)
            .map_or(0, |s| s.iter().filter(|s| !s.is_closed()).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    enum Event {
        Ping(u32),
        Pong(u32),
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum Topic {
        Ping,
        Pong,
    }

    impl Topical for Event {
        type Topic = Topic;
        fn topic(&self) -> Topic {
            match self {
                Self::Ping(_) => Topic::Ping,
                Self::Pong(_) => Topic::Pong,
            }
        }
    }

    #[test]
    fn routes_by_topic() {
        let bus = Bus::<Event>::new();
        let mut pings = bus.subscribe(Topic::Ping);
        let mut pongs = bus.subscribe(Topic::Pong);
        assert_eq!(bus.publish(Event::Ping(1)), 1);
        assert_eq!(bus.publish(Event::Pong(2)), 1);
        assert_eq!(pings.try_recv().unwrap(), Event::Ping(1));
        assert!(pings.try_recv().is_err());
        assert_eq!(pongs.try_recv().unwrap(), Event::Pong(2));
    }

    #[test]
    fn fan_out_and_dropped_subscribers() {
        let bus = Bus::<Event>::new();
        let mut a = bus.subscribe(Topic::Ping);
        let b = bus.subscribe(Topic::Ping);
        drop(b);
        assert_eq!(bus.subscribers(Topic::Ping), 1);
        assert_eq!(bus.publish(Event::Ping(7)), 1);
        assert_eq!(a.try_recv().unwrap(), Event::Ping(7));
        assert_eq!(bus.publish(Event::Pong(0)), 0);
    }
}
