// Path: crates/pstore-channel/src/lib.rs

#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo
    )
)]

//! Named pub/sub channels (§4.F). A [`Channel`] holds a subscriber list;
//! [`Channel::publish`] appends a message to every subscriber's FIFO and
//! wakes each one's [`pstore_os::SignalNotifier`]. The status server's
//! single-threaded `select` loop (`pstore-http`) polls its own subscriber's
//! wake descriptor alongside its socket, so — unlike a single condition
//! variable shared by blocked threads — each subscriber gets its own edge-
//! triggered descriptor (teacher analogue: `ioi-networking`'s libp2p
//! mempool gossip fan-out, reshaped from one topic into a named-channel map).

mod registry;
mod subscriber;

pub use registry::Registry;
pub use subscriber::{Subscriber, SubscriberId};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use pstore_os::SignalNotifier;
use pstore_types::Result;

struct SubscriberState {
    id: SubscriberId,
    queue: Mutex<VecDeque<String>>,
    notifier: SignalNotifier,
}

/// A single named broadcast topic. Cheap to hold by `Arc`; cloned handles
/// all observe the same subscriber list.
pub struct Channel {
    name: String,
    subscribers: Mutex<Vec<std::sync::Arc<SubscriberState>>>,
    next_id: AtomicU64,
}

impl Channel {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Ok(Channel { name: name.into(), subscribers: Mutex::new(Vec::new()), next_id: AtomicU64::new(0) })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a new subscriber with an empty FIFO and its own wake
    /// descriptor.
    pub fn new_subscriber(&self) -> Result<Subscriber> {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let state = std::sync::Arc::new(SubscriberState {
            id,
            queue: Mutex::new(VecDeque::new()),
            notifier: SignalNotifier::new()?,
        });
        let mut subs = self.subscribers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        subs.push(state.clone());
        Ok(Subscriber::new(state))
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut subs = self.subscribers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        subs.retain(|s| s.id != id);
    }

    /// Appends `msg` to every subscriber's queue, in registration order,
    /// then wakes each one. Per §5 "Ordering": each subscriber observes
    /// messages in the order they were published; publish's own append
    /// loop is the only source of cross-subscriber interleaving.
    pub fn publish(&self, msg: &str) {
        let subs = self.subscribers.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for sub in subs.iter() {
            sub.queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push_back(msg.to_string());
            sub.notifier.notify();
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_subscriber_sees_every_published_message_in_order() {
        let channel = Channel::new("status").unwrap();
        let a = channel.new_subscriber().unwrap();
        let b = channel.new_subscriber().unwrap();
        channel.publish("one");
        channel.publish("two");
        assert_eq!(a.pop(), Some("one".to_string()));
        assert_eq!(a.pop(), Some("two".to_string()));
        assert_eq!(a.pop(), None);
        assert_eq!(b.pop(), Some("one".to_string()));
        assert_eq!(b.pop(), Some("two".to_string()));
    }

    #[test]
    fn unsubscribe_stops_future_deliveries() {
        let channel = Channel::new("status").unwrap();
        let a = channel.new_subscriber().unwrap();
        channel.unsubscribe(a.id());
        channel.publish("ignored");
        assert_eq!(channel.subscriber_count(), 0);
    }
}
