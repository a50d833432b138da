//! Collaborator traits the registry delegates to.
//!
//! The registry owns one implementation of each trait and only ever calls
//! them with its lock held, so implementations need no locking of their own.

use crossbeam_channel::Sender;

use super::mask::EventMask;
use super::subscription::{SubscriptionId, WatchTarget};

/// Raw event as produced by the kernel notification channel.
pub type RawEvent = notify::Result<notify::Event>;

/// A translated kernel event for one subscription.
///
/// Transient: consumed by the registry within a single dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelEvent {
    pub subscription: SubscriptionId,
    pub mask: EventMask,
    /// Name of the affected entry inside the watched directory, if any.
    pub name: Option<String>,
}

/// Everything a raw event resolved to.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KernelBatch {
    pub events: Vec<KernelEvent>,
    /// Subscriptions whose kernel watch went away (e.g. the directory was
    /// deleted). The registry hands them to the missing-path registry.
    pub lost: Vec<SubscriptionId>,
}

/// The layer that talks to the OS change-notification mechanism.
pub trait KernelWatch: Send {
    /// One-time setup. Raw events must be pushed into `queue`.
    fn init(&mut self, queue: Sender<RawEvent>) -> bool;

    /// Start watching `target` on behalf of `id`.
    ///
    /// Returns `false` if the path cannot be watched right now.
    fn start_watching(&mut self, id: SubscriptionId, target: &WatchTarget) -> bool;

    /// Stop watching for `id`. Must be a no-op if `id` is not watched.
    fn stop_watching(&mut self, id: SubscriptionId);

    /// Resolve a raw event into per-subscription kernel events.
    fn translate(&mut self, raw: &notify::Event) -> KernelBatch;
}

/// Registry of subscriptions whose path could not be watched yet.
pub trait MissingPaths: Send {
    fn init(&mut self);

    /// Track `id` until its target becomes watchable.
    fn add(&mut self, id: SubscriptionId, target: &WatchTarget);

    /// Forget `id`. Must be a no-op if `id` is not tracked.
    fn remove(&mut self, id: SubscriptionId);

    /// Retry every tracked entry against `kernel`.
    ///
    /// Entries that are now watched are forgotten and returned.
    fn rescan(&mut self, kernel: &mut dyn KernelWatch) -> Vec<SubscriptionId>;

    /// Number of tracked entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Snapshot of registry occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub active: usize,
    pub missing: usize,
}

/// Optional introspection hook.
pub trait Diagnostics: Send {
    fn init(&mut self);

    fn report(&self, stats: &RegistryStats);
}
