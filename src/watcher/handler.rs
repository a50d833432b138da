//! Handler trait and notification types for registry callbacks.

use crossbeam_channel::Sender;

use super::mask::EventMask;

/// Receives notifications for all subscriptions of a registry.
///
/// Both methods are called with the registry lock held. Implementations
/// must not call back into the registry; hand work off (e.g. through a
/// channel) instead.
pub trait SubscriptionHandler<T>: Send + Sync {
    /// A watched path changed.
    ///
    /// `fullpath` ends in `/` when the watched directory itself changed.
    fn on_event(&self, fullpath: &str, mask: EventMask, data: &T);

    /// A previously missing path became watchable.
    fn on_found(&self, fullpath: &str, data: &T);
}

/// What happened to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Event { path: String, mask: EventMask },
    Found { path: String },
}

impl Notification {
    pub fn path(&self) -> &str {
        match self {
            Notification::Event { path, .. } | Notification::Found { path } => path,
        }
    }
}

/// Handler that forwards every notification into a channel.
///
/// Each message carries a clone of the subscription's user data.
#[derive(Debug, Clone)]
pub struct ChannelHandler<T> {
    tx: Sender<(Notification, T)>,
}

impl<T> ChannelHandler<T> {
    pub fn new(tx: Sender<(Notification, T)>) -> Self {
        Self { tx }
    }
}

impl<T: Clone + Send + Sync> SubscriptionHandler<T> for ChannelHandler<T> {
    fn on_event(&self, fullpath: &str, mask: EventMask, data: &T) {
        let notification = Notification::Event {
            path: fullpath.to_string(),
            mask,
        };
        if self.tx.send((notification, data.clone())).is_err() {
            crate::debug_event!("handler", "receiver gone, dropping event", "{fullpath}");
        }
    }

    fn on_found(&self, fullpath: &str, data: &T) {
        let notification = Notification::Found {
            path: fullpath.to_string(),
        };
        if self.tx.send((notification, data.clone())).is_err() {
            crate::debug_event!("handler", "receiver gone, dropping found", "{fullpath}");
        }
    }
}
