// Path: crates/pstore-channel/src/registry.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use pstore_types::Result;

use crate::Channel;

/// The map from channel name to channel (§4.F "The channel container is a
/// map from channel-name to `(channel*, cv*)`" — the CV lives inside each
/// [`Channel`] itself here, one per subscriber).
#[derive(Default)]
pub struct Registry {
    channels: Mutex<HashMap<String, Arc<Channel>>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn get_or_create(&self, name: &str) -> Result<Arc<Channel>> {
        let mut channels = self.channels.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(existing) = channels.get(name) {
            return Ok(existing.clone());
        }
        let channel = Arc::new(Channel::new(name)?);
        channels.insert(name.to_string(), channel.clone());
        Ok(channel)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get(name).cloned()
    }

    /// Name and subscriber count of every registered channel, for the
    /// status broadcast's per-channel client counts.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, usize)> {
        self.channels
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .map(|(name, channel)| (name.clone(), channel.subscriber_count()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_the_same_channel_on_repeat_lookup() {
        let registry = Registry::new();
        let a = registry.get_or_create("status").unwrap();
        let b = registry.get_or_create("status").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn unknown_channel_is_absent() {
        let registry = Registry::new();
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn snapshot_reports_each_channels_subscriber_count() {
        let registry = Registry::new();
        let status = registry.get_or_create("status").unwrap();
        status.new_subscriber().unwrap();
        registry.get_or_create("empty").unwrap();

        let mut snapshot = registry.snapshot();
        snapshot.sort();
        assert_eq!(snapshot, vec![("empty".to_string(), 0), ("status".to_string(), 1)]);
    }
}
