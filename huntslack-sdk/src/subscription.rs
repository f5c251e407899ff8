//! Per-channel subscriber table and callback fan-out.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::channel::Channel;

/// Callback invoked with the current record of a subscribed channel.
pub type ChannelCallback = Arc<dyn Fn(&Channel) -> anyhow::Result<()> + Send + Sync>;

/// Channel name → subscriber id → callback.
///
/// A name with no subscribers has no slot.
#[derive(Default)]
pub struct SubscriptionTable {
    by_name: HashMap<String, HashMap<String, ChannelCallback>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for (`name`, `subscriber_id`). Returns true if an
    /// earlier callback for the same pair was replaced.
    pub fn insert(&mut self, name: &str, subscriber_id: &str, callback: ChannelCallback) -> bool {
        self.by_name
            .entry(name.to_string())
            .or_default()
            .insert(subscriber_id.to_string(), callback)
            .is_some()
    }

    /// Remove one subscriber. Returns false if it was not registered.
    pub fn remove(&mut self, name: &str, subscriber_id: &str) -> bool {
        let Some(subs) = self.by_name.get_mut(name) else {
            return false;
        };
        let removed = subs.remove(subscriber_id).is_some();
        if subs.is_empty() {
            self.by_name.remove(name);
        }
        removed
    }

    /// Snapshot of the callbacks for `name`, so they can be run without
    /// holding whatever lock guards the table.
    pub fn callbacks_for(&self, name: &str) -> Vec<ChannelCallback> {
        self.by_name
            .get(name)
            .map(|subs| subs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.by_name.get(name).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Invoke every callback registered for `channel.name`.
    pub fn notify(&self, channel: &Channel) {
        deliver(&self.callbacks_for(&channel.name), channel);
    }
}

impl std::fmt::Debug for SubscriptionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .by_name
            .iter()
            .map(|(name, subs)| (name.as_str(), subs.len()))
            .collect();
        f.debug_struct("SubscriptionTable")
            .field("by_name", &counts)
            .finish()
    }
}

/// Run each callback with `channel`. A failing or panicking callback is
/// logged and does not stop delivery to the others.
pub fn deliver(callbacks: &[ChannelCallback], channel: &Channel) {
    for callback in callbacks {
        match catch_unwind(AssertUnwindSafe(|| callback(channel))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(channel = %channel.name, error = %e, "Subscriber callback failed");
            }
            Err(_) => {
                tracing::warn!(channel = %channel.name, "Subscriber callback panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> ChannelCallback {
        let counter = counter.clone();
        Arc::new(move |_c: &Channel| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn resubscribe_replaces_callback() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut table = SubscriptionTable::new();

        assert!(!table.insert("general", "tab-1", counting(&first)));
        assert!(table.insert("general", "tab-1", counting(&second)));
        assert_eq!(table.subscriber_count("general"), 1);

        table.notify(&Channel::new("C1", "general"));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removing_last_subscriber_drops_slot() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut table = SubscriptionTable::new();
        table.insert("general", "tab-1", counting(&hits));
        table.insert("general", "tab-2", counting(&hits));

        assert!(table.remove("general", "tab-1"));
        assert!(table.contains("general"));
        assert!(table.remove("general", "tab-2"));
        assert!(!table.contains("general"));
        assert!(table.is_empty());
        assert!(table.callbacks_for("general").is_empty());
    }

    #[test]
    fn remove_unknown_is_false() {
        let mut table = SubscriptionTable::new();
        assert!(!table.remove("general", "tab-1"));
        assert!(table.is_empty());
    }

    #[test]
    fn notify_only_reaches_matching_name() {
        let general = Arc::new(AtomicUsize::new(0));
        let random = Arc::new(AtomicUsize::new(0));
        let mut table = SubscriptionTable::new();
        table.insert("general", "tab-1", counting(&general));
        table.insert("random", "tab-1", counting(&random));

        table.notify(&Channel::new("C1", "general"));
        assert_eq!(general.load(Ordering::SeqCst), 1);
        assert_eq!(random.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failing_callbacks_do_not_block_others() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut table = SubscriptionTable::new();
        table.insert(
            "general",
            "err",
            Arc::new(|_c: &Channel| -> anyhow::Result<()> { anyhow::bail!("tab closed") }),
        );
        table.insert(
            "general",
            "panic",
            Arc::new(|_c: &Channel| -> anyhow::Result<()> { panic!("boom") }),
        );
        table.insert("general", "ok-1", counting(&hits));
        table.insert("general", "ok-2", counting(&hits));

        table.notify(&Channel::new("C1", "general"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
