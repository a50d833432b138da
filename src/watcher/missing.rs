//! Missing-path registry that retries on every rescan.

use indexmap::IndexMap;

use super::backend::{KernelWatch, MissingPaths};
use super::subscription::{SubscriptionId, WatchTarget};

/// [`MissingPaths`] that keeps unwatchable targets in insertion order and
/// retries all of them on each rescan.
#[derive(Debug, Default)]
pub struct PollingMissing {
    pending: IndexMap<SubscriptionId, WatchTarget>,
}

impl PollingMissing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.pending.contains_key(&id)
    }
}

impl MissingPaths for PollingMissing {
    fn init(&mut self) {
        crate::debug_event!("missing", "initialized");
    }

    fn add(&mut self, id: SubscriptionId, target: &WatchTarget) {
        self.pending.insert(id, target.clone());
    }

    fn remove(&mut self, id: SubscriptionId) {
        self.pending.shift_remove(&id);
    }

    fn rescan(&mut self, kernel: &mut dyn KernelWatch) -> Vec<SubscriptionId> {
        let mut found = Vec::new();

        self.pending.retain(|id, target| {
            if kernel.start_watching(*id, target) {
                crate::debug_event!("missing", "found", "{target}");
                found.push(*id);
                false
            } else {
                true
            }
        });

        found
    }

    fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::backend::{KernelBatch, RawEvent};
    use crate::watcher::subscription::Subscription;
    use crossbeam_channel::Sender;
    use std::collections::HashSet;

    /// Kernel that can watch only the ids it was told about.
    #[derive(Default)]
    struct SelectiveKernel {
        watchable: HashSet<SubscriptionId>,
        watched: Vec<SubscriptionId>,
    }

    impl KernelWatch for SelectiveKernel {
        fn init(&mut self, _queue: Sender<RawEvent>) -> bool {
            true
        }
        fn start_watching(&mut self, id: SubscriptionId, _target: &WatchTarget) -> bool {
            if self.watchable.contains(&id) {
                self.watched.push(id);
                true
            } else {
                false
            }
        }
        fn stop_watching(&mut self, _id: SubscriptionId) {}
        fn translate(&mut self, _raw: &notify::Event) -> KernelBatch {
            KernelBatch::default()
        }
    }

    #[test]
    fn test_rescan_returns_only_found() {
        let a = Subscription::directory("/tmp/a", ());
        let b = Subscription::directory("/tmp/b", ());
        let mut missing = PollingMissing::new();
        missing.add(a.id(), a.target());
        missing.add(b.id(), b.target());

        let mut kernel = SelectiveKernel::default();
        assert!(missing.rescan(&mut kernel).is_empty());
        assert_eq!(missing.len(), 2);

        kernel.watchable.insert(b.id());
        assert_eq!(missing.rescan(&mut kernel), vec![b.id()]);
        assert_eq!(kernel.watched, vec![b.id()]);
        assert!(missing.contains(a.id()));
        assert!(!missing.contains(b.id()));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let a = Subscription::directory("/tmp/a", ());
        let mut missing = PollingMissing::new();
        missing.remove(a.id());
        missing.add(a.id(), a.target());
        missing.remove(a.id());
        missing.remove(a.id());
        assert!(missing.is_empty());
    }
}
