//! Subscriptions: one caller's interest in a directory or a file inside it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Subscription`] instance.
///
/// Collaborators key their bookkeeping on this instead of holding
/// references to the subscription itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        SubscriptionId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The path a subscription is interested in.
///
/// This is all a kernel layer or missing-path registry gets to see; user
/// data stays with the [`Subscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub dirname: String,
    pub filename: Option<String>,
}

impl WatchTarget {
    pub fn new(dirname: impl Into<String>, filename: Option<String>) -> Self {
        Self {
            dirname: dirname.into(),
            filename,
        }
    }

    /// `<dirname>/<name>`, or `<dirname>/` when there is no name.
    ///
    /// The trailing-slash form stands for the directory itself.
    pub fn join(&self, name: Option<&str>) -> String {
        match name {
            Some(name) => format!("{}/{name}", self.dirname),
            None => format!("{}/", self.dirname),
        }
    }

    /// Full path of the watched entity.
    pub fn full_path(&self) -> String {
        self.join(self.filename.as_deref())
    }
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_path())
    }
}

/// A standing request to be notified about changes to a path.
///
/// Callers create subscriptions and share them with the registry as
/// `Arc<Subscription<T>>`. The `data` payload is never inspected by the
/// registry; it is handed back to the handler with every notification.
#[derive(Debug)]
pub struct Subscription<T> {
    id: SubscriptionId,
    target: WatchTarget,
    data: T,
    cancelled: AtomicBool,
}

impl<T> Subscription<T> {
    /// Watch the directory `dirname` itself.
    pub fn directory(dirname: impl Into<String>, data: T) -> Self {
        Self::new(WatchTarget::new(dirname, None), data)
    }

    /// Watch `filename` inside `dirname`.
    pub fn file(dirname: impl Into<String>, filename: impl Into<String>, data: T) -> Self {
        Self::new(WatchTarget::new(dirname, Some(filename.into())), data)
    }

    pub fn new(target: WatchTarget, data: T) -> Self {
        Self {
            id: SubscriptionId::next(),
            target,
            data,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    pub fn dirname(&self) -> &str {
        &self.target.dirname
    }

    pub fn filename(&self) -> Option<&str> {
        self.target.filename.as_deref()
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    /// Whether the subscription has been cancelled. Cancellation is final.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Marks the subscription cancelled, returning `false` if it already was.
    pub(crate) fn mark_cancelled(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }
}
