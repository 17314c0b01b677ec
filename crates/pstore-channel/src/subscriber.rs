// Path: crates/pstore-channel/src/subscriber.rs

use std::sync::Arc;

use crate::SubscriberState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub(crate) u64);

/// A handle returned by [`crate::Channel::new_subscriber`]. Dropping it does
/// not remove the subscriber from the channel; call
/// [`crate::Channel::unsubscribe`] with [`Subscriber::id`] for that.
pub struct Subscriber {
    state: Arc<SubscriberState>,
}

impl Subscriber {
    pub(crate) fn new(state: Arc<SubscriberState>) -> Self {
        Subscriber { state }
    }

    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.state.id
    }

    /// Pops the oldest undelivered message, or `None` if the FIFO is empty.
    pub fn pop(&self) -> Option<String> {
        self.state.queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner).pop_front()
    }

    /// The raw descriptor the server's `select`/`WSAWaitForMultipleEvents`
    /// loop polls alongside the connection's socket (§4.I step 3).
    #[cfg(unix)]
    #[must_use]
    pub fn wait_descriptor(&self) -> std::os::unix::io::RawFd {
        self.state.notifier.wait_descriptor()
    }

    #[cfg(windows)]
    #[must_use]
    pub fn wait_descriptor(&self) -> std::os::windows::io::RawHandle {
        self.state.notifier.wait_descriptor()
    }

    /// Blocks until the channel has been published to since the last reset.
    pub fn wait(&self) -> std::io::Result<()> {
        self.state.notifier.wait()
    }

    /// Clears the wake edge after a batch of messages has been drained
    /// (§5 "the CV wake is an edge signal, so receivers must drain until
    /// empty on each wake").
    pub fn reset(&self) {
        self.state.notifier.reset();
    }
}
