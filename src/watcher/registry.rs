//! The subscription registry.
//!
//! One lock guards the subscription table, the user handler and the
//! collaborators. The kernel reader thread takes it while translating raw
//! events, the rescan thread takes it while retrying missing paths, and
//! every public operation takes it on entry. Translation runs as methods of
//! the locked state, so it can never re-acquire the lock.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::config::WatcherConfig;

use super::backend::{
    Diagnostics, KernelEvent, KernelWatch, MissingPaths, RawEvent, RegistryStats,
};
use super::diagnostics::TracingDiagnostics;
use super::error::WatchError;
use super::handler::SubscriptionHandler;
use super::kernel::NotifyKernel;
use super::missing::PollingMissing;
use super::subscription::{Subscription, SubscriptionId};

/// Registry of active subscriptions.
///
/// Cloning yields another handle to the same registry.
pub struct Registry<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    core: Mutex<Core<T>>,
    /// Mirrors startup success so `running()` needs no lock.
    initialized: AtomicBool,
    /// `None` disables the background rescan thread.
    rescan_interval: Option<Duration>,
    /// Never sent on. Dropping the registry disconnects it, which wakes
    /// the rescan thread.
    _shutdown: Sender<()>,
    shutdown_rx: Receiver<()>,
}

/// State guarded by the registry lock.
struct Core<T> {
    table: IndexMap<SubscriptionId, Arc<Subscription<T>>>,
    kernel: Box<dyn KernelWatch>,
    missing: Box<dyn MissingPaths>,
    diagnostics: Box<dyn Diagnostics>,
    /// Set by a successful startup, never replaced afterwards.
    handler: Option<Arc<dyn SubscriptionHandler<T>>>,
}

impl<T: Send + Sync + 'static> Registry<T> {
    /// Create a builder with the default collaborators.
    pub fn builder() -> RegistryBuilder<T> {
        RegistryBuilder::new()
    }

    /// Initialize the kernel layer and start delivering notifications to
    /// `handler`.
    ///
    /// Only the first successful call has any effect; later calls return
    /// `true` without touching any collaborator. A failed call leaves the
    /// registry uninitialized so it can be retried.
    pub fn startup(&self, handler: Arc<dyn SubscriptionHandler<T>>) -> bool {
        let mut core = self.inner.core.lock();

        if self.inner.initialized.load(Ordering::Acquire) {
            return true;
        }

        let (tx, rx) = unbounded();
        if !core.kernel.init(tx) {
            tracing::warn!("[registry] could not initialize kernel watcher");
            return false;
        }

        // The threads block on the lock until startup is done.
        if let Err(e) = self.spawn_threads(rx) {
            tracing::error!("[registry] failed to spawn worker thread: {e}");
            return false;
        }

        core.handler = Some(handler);
        core.missing.init();
        core.diagnostics.init();
        self.inner.initialized.store(true, Ordering::Release);
        drop(core);

        crate::log_event!("registry", "started");
        true
    }

    /// Whether `startup` has succeeded.
    pub fn running(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Register a subscription.
    ///
    /// If the path cannot be watched yet the subscription is parked in the
    /// missing-path registry and reported through `on_found` once it can.
    pub fn add(&self, sub: Arc<Subscription<T>>) -> Result<(), WatchError> {
        let mut core = self.inner.core.lock();

        if core.table.contains_key(&sub.id()) {
            return Err(WatchError::DuplicateSubscription {
                id: sub.id(),
                path: sub.target().full_path(),
            });
        }
        if sub.is_cancelled() {
            return Err(WatchError::SubscriptionCancelled { id: sub.id() });
        }

        if core.kernel.start_watching(sub.id(), sub.target()) {
            crate::debug_event!("registry", "watching", "{}", sub.target());
        } else {
            crate::debug_event!("registry", "missing", "{}", sub.target());
            core.missing.add(sub.id(), sub.target());
        }

        core.table.insert(sub.id(), sub);
        Ok(())
    }

    /// Cancel a single subscription.
    ///
    /// Returns `false` if it was not active in this registry.
    pub fn cancel(&self, sub: &Subscription<T>) -> bool {
        self.inner.core.lock().cancel(sub).is_some()
    }

    /// Cancel every subscription for which `predicate` returns `true` and
    /// hand the registry's references back to the caller.
    pub fn for_each<F>(&self, predicate: F) -> Vec<Arc<Subscription<T>>>
    where
        F: FnMut(&Subscription<T>) -> bool,
    {
        self.cancel_matching(predicate)
    }

    /// Cancel every subscription for which `predicate` returns `true` and
    /// release them. Returns how many were cancelled.
    ///
    /// A subscription the caller holds no other reference to is freed,
    /// user data included.
    pub fn for_each_and_free<F>(&self, predicate: F) -> usize
    where
        F: FnMut(&Subscription<T>) -> bool,
    {
        let cancelled = self.cancel_matching(predicate);
        let count = cancelled.len();
        drop(cancelled);
        count
    }

    fn cancel_matching<F>(&self, mut predicate: F) -> Vec<Arc<Subscription<T>>>
    where
        F: FnMut(&Subscription<T>) -> bool,
    {
        let mut core = self.inner.core.lock();

        // Cancelling removes from the table, so walk a snapshot of the keys.
        let ids: Vec<SubscriptionId> = core.table.keys().copied().collect();
        let mut cancelled = Vec::new();

        for id in ids {
            let Some(sub) = core.table.get(&id).cloned() else {
                continue;
            };
            if predicate(&sub) {
                cancelled.extend(core.cancel(&sub));
            }
        }

        cancelled
    }

    /// Retry all missing paths now and deliver `on_found` for the ones that
    /// became watchable.
    pub fn rescan_missing(&self) {
        self.inner.rescan_missing();
    }

    pub fn stats(&self) -> RegistryStats {
        self.inner.core.lock().stats()
    }

    /// Send a stats snapshot to the diagnostics reporter.
    pub fn report_diagnostics(&self) {
        let core = self.inner.core.lock();
        core.diagnostics.report(&core.stats());
    }

    pub fn len(&self) -> usize {
        self.inner.core.lock().table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `sub` is active in this registry.
    pub fn contains(&self, sub: &Subscription<T>) -> bool {
        self.inner.core.lock().table.contains_key(&sub.id())
    }

    /// Start the kernel reader and, if enabled, the rescan thread.
    ///
    /// On error nothing is left delivering: a reader that did start exits
    /// once the kernel layer is re-initialized or the registry dropped.
    fn spawn_threads(&self, rx: Receiver<RawEvent>) -> std::io::Result<()> {
        let inner = Arc::downgrade(&self.inner);
        thread::Builder::new()
            .name("subwatch-kernel".to_string())
            .spawn(move || run_kernel_reader(inner, rx))?;

        if let Some(interval) = self.inner.rescan_interval {
            let inner = Arc::downgrade(&self.inner);
            let shutdown = self.inner.shutdown_rx.clone();
            thread::Builder::new()
                .name("subwatch-rescan".to_string())
                .spawn(move || run_rescanner(inner, interval, shutdown))?;
        }

        Ok(())
    }
}

impl<T> Inner<T> {
    fn dispatch(&self, raw: RawEvent) {
        match raw {
            Ok(event) => self.core.lock().dispatch(&event),
            Err(e) => tracing::warn!("[registry] kernel watch error: {e}"),
        }
    }

    fn rescan_missing(&self) {
        let mut guard = self.core.lock();
        let core = &mut *guard;

        if core.missing.is_empty() {
            return;
        }

        let found = core.missing.rescan(core.kernel.as_mut());
        for id in found {
            match core.table.get(&id) {
                Some(sub) => core.translate_found(sub),
                None => {
                    // Not ours any more; don't leave a stray kernel watch.
                    core.kernel.stop_watching(id);
                }
            }
        }
    }
}

impl<T> Core<T> {
    /// Cancel `sub`. No-op if it is already cancelled or not in the table.
    ///
    /// Both collaborators are told to forget it; each tolerates ids it
    /// does not know, which covers a missing path promoted to a kernel
    /// watch just before cancellation.
    fn cancel(&mut self, sub: &Subscription<T>) -> Option<Arc<Subscription<T>>> {
        if sub.is_cancelled() || !self.table.contains_key(&sub.id()) {
            return None;
        }

        sub.mark_cancelled();
        crate::debug_event!("registry", "cancelling", "{}", sub.target());
        self.missing.remove(sub.id());
        self.kernel.stop_watching(sub.id());
        self.table.shift_remove(&sub.id())
    }

    fn dispatch(&mut self, raw: &notify::Event) {
        let batch = self.kernel.translate(raw);

        for event in &batch.events {
            self.translate_event(event);
        }

        for id in batch.lost {
            if let Some(sub) = self.table.get(&id) {
                crate::debug_event!("registry", "watch lost", "{}", sub.target());
                self.missing.add(id, sub.target());
            }
        }
    }

    /// Deliver a kernel event as `<dirname>/<name>` (or `<dirname>/`).
    fn translate_event(&self, event: &KernelEvent) {
        let (Some(sub), Some(handler)) = (self.table.get(&event.subscription), &self.handler)
        else {
            return;
        };

        let fullpath = sub.target().join(event.name.as_deref());
        handler.on_event(&fullpath, event.mask, sub.data());
    }

    /// Deliver a found notification, unless the path vanished again.
    fn translate_found(&self, sub: &Subscription<T>) {
        let Some(handler) = &self.handler else {
            return;
        };

        let fullpath = sub.target().full_path();
        if !Path::new(&fullpath).exists() {
            crate::debug_event!("registry", "stale found dropped", "{fullpath}");
            return;
        }

        handler.on_found(&fullpath, sub.data());
    }

    fn stats(&self) -> RegistryStats {
        RegistryStats {
            active: self.table.len(),
            missing: self.missing.len(),
        }
    }
}

fn run_kernel_reader<T>(inner: Weak<Inner<T>>, rx: Receiver<RawEvent>) {
    for raw in rx.iter() {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.dispatch(raw);
    }
    crate::debug_event!("registry", "kernel reader stopped");
}

fn run_rescanner<T>(inner: Weak<Inner<T>>, interval: Duration, shutdown: Receiver<()>) {
    while let Err(RecvTimeoutError::Timeout) = shutdown.recv_timeout(interval) {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.rescan_missing();
    }
    crate::debug_event!("registry", "rescanner stopped");
}

/// Builder for constructing a [`Registry`].
pub struct RegistryBuilder<T> {
    kernel: Option<Box<dyn KernelWatch>>,
    missing: Option<Box<dyn MissingPaths>>,
    diagnostics: Option<Box<dyn Diagnostics>>,
    rescan_interval: Option<Duration>,
    _data: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> RegistryBuilder<T> {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            kernel: None,
            missing: None,
            diagnostics: None,
            rescan_interval: WatcherConfig::default().rescan_interval(),
            _data: PhantomData,
        }
    }

    /// Apply the `[watcher]` settings section.
    pub fn config(mut self, config: &WatcherConfig) -> Self {
        self.rescan_interval = config.rescan_interval();
        self
    }

    /// Set the kernel watch layer.
    pub fn kernel(mut self, kernel: impl KernelWatch + 'static) -> Self {
        self.kernel = Some(Box::new(kernel));
        self
    }

    /// Set the missing-path registry.
    pub fn missing(mut self, missing: impl MissingPaths + 'static) -> Self {
        self.missing = Some(Box::new(missing));
        self
    }

    /// Set the diagnostics reporter.
    pub fn diagnostics(mut self, diagnostics: impl Diagnostics + 'static) -> Self {
        self.diagnostics = Some(Box::new(diagnostics));
        self
    }

    /// How often missing paths are retried in the background.
    pub fn rescan_interval(mut self, interval: Duration) -> Self {
        self.rescan_interval = Some(interval);
        self
    }

    /// Only rescan missing paths when [`Registry::rescan_missing`] is called.
    pub fn manual_rescan(mut self) -> Self {
        self.rescan_interval = None;
        self
    }

    /// Build the Registry.
    pub fn build(self) -> Registry<T> {
        let core = Core {
            table: IndexMap::new(),
            kernel: self.kernel.unwrap_or_else(|| Box::new(NotifyKernel::new())),
            missing: self.missing.unwrap_or_else(|| Box::new(PollingMissing::new())),
            diagnostics: self
                .diagnostics
                .unwrap_or_else(|| Box::new(TracingDiagnostics::new())),
            handler: None,
        };

        let (shutdown, shutdown_rx) = unbounded();
        Registry {
            inner: Arc::new(Inner {
                core: Mutex::new(core),
                initialized: AtomicBool::new(false),
                rescan_interval: self.rescan_interval,
                _shutdown: shutdown,
                shutdown_rx,
            }),
        }
    }
}

impl<T: Send + Sync + 'static> Default for RegistryBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
