//! Listener reference counts
//!
//! The subscription layer attaches one remote listener per query key and
//! shares it between subscribers. [`ListenerCounts`] tracks how many
//! subscribers each key has so the caller knows when to emit
//! `unset-listener`.

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ListenerCounts {
    counts: BTreeMap<String, usize>,
}

impl ListenerCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber; returns the new count (1 means attach a listener)
    pub fn acquire(&mut self, key: impl Into<String>) -> usize {
        let count = self.counts.entry(key.into()).or_insert(0);
        *count += 1;
        *count
    }

    /// Drop a subscriber; returns the remaining count (0 means unset)
    pub fn release(&mut self, key: &str) -> usize {
        let Some(count) = self.counts.get_mut(key) else {
            return 0;
        };
        *count = count.saturating_sub(1);
        let remaining = *count;
        if remaining == 0 {
            self.counts.remove(key);
        }
        remaining
    }

    pub fn count(&self, key: &str) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Keys with at least one subscriber
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }
}
