//! Kernel watch layer backed by `notify`.
//!
//! Every subscription watches its directory non-recursively. Directories
//! shared by several subscriptions are watched once and released when the
//! last subscription on them stops.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crossbeam_channel::Sender;
use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::backend::{KernelBatch, KernelEvent, KernelWatch, RawEvent};
use super::error::WatchError;
use super::mask::EventMask;
use super::subscription::{SubscriptionId, WatchTarget};

/// [`KernelWatch`] over `notify::RecommendedWatcher` (inotify on Linux).
#[derive(Default)]
pub struct NotifyKernel {
    watcher: Option<RecommendedWatcher>,
    /// Watched directory -> subscriptions on it.
    dirs: HashMap<PathBuf, Vec<SubscriptionId>>,
    targets: HashMap<SubscriptionId, WatchTarget>,
    /// Nested-directory events already delivered to the parent side,
    /// waiting for their twin from the directory's own watch.
    echoes: Vec<(PathBuf, EventMask)>,
}

/// Unpaired echoes kept before the oldest are forgotten.
const MAX_ECHOES: usize = 64;

/// Directory the kernel watches for `target`. An empty dirname is the root.
fn watch_dir_of(target: &WatchTarget) -> PathBuf {
    if target.dirname.is_empty() {
        PathBuf::from("/")
    } else {
        PathBuf::from(&target.dirname)
    }
}

impl NotifyKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of directories with a live kernel watch.
    pub fn watched_dirs(&self) -> usize {
        self.dirs.len()
    }

    fn create_watcher(queue: Sender<RawEvent>) -> Result<RecommendedWatcher, WatchError> {
        let watcher = notify::recommended_watcher(move |res: RawEvent| {
            // Receiver only goes away when the registry does.
            let _ = queue.send(res);
        })?;
        Ok(watcher)
    }

    fn watch_dir(&mut self, dir: &Path) -> Result<(), WatchError> {
        let Some(watcher) = self.watcher.as_mut() else {
            return Err(WatchError::PathWatchFailed {
                path: dir.to_path_buf(),
                reason: "kernel watcher not initialized".to_string(),
            });
        };

        if !dir.is_dir() {
            return Err(WatchError::PathWatchFailed {
                path: dir.to_path_buf(),
                reason: "not an existing directory".to_string(),
            });
        }

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })
    }

    fn unwatch_dir(&mut self, dir: &Path) {
        if let Some(watcher) = self.watcher.as_mut() {
            if let Err(e) = watcher.unwatch(dir) {
                // Already gone when the directory itself was deleted.
                crate::debug_event!("kernel", "unwatch failed", "{}: {e}", dir.display());
            }
        }
    }

    /// An event on a watched directory itself.
    fn translate_self(&mut self, dir: &Path, mask: EventMask, batch: &mut KernelBatch) {
        let gone = mask.intersects(EventMask::DELETE | EventMask::MOVED_FROM);
        let mask = if mask.contains(EventMask::DELETE) {
            (mask - EventMask::DELETE) | EventMask::DELETE_SELF
        } else if mask.contains(EventMask::MOVED_FROM) {
            (mask - EventMask::MOVED_FROM) | EventMask::MOVE_SELF
        } else {
            mask
        };

        let Some(ids) = self.dirs.get(dir) else {
            return;
        };

        for id in ids {
            let is_dir_sub = self
                .targets
                .get(id)
                .is_some_and(|target| target.filename.is_none());
            if is_dir_sub {
                batch.events.push(KernelEvent {
                    subscription: *id,
                    mask,
                    name: None,
                });
            }
        }

        if gone {
            if let Some(ids) = self.dirs.remove(dir) {
                for id in &ids {
                    self.targets.remove(id);
                }
                batch.lost.extend(ids);
            }
            self.echoes.retain(|(p, _)| p != dir);
            self.unwatch_dir(dir);
            crate::debug_event!("kernel", "directory gone", "{}", dir.display());
        }
    }

    /// Route an event on a watched directory that is also an entry of
    /// another watched directory.
    ///
    /// inotify reports such a change once on each watch and notify turns
    /// both into the same path-only event. The first goes to the parent's
    /// subscriptions, its twin to the directory's own.
    fn translate_nested(&mut self, path: &Path, mask: EventMask, batch: &mut KernelBatch) {
        // Removal comes as DELETE on the parent and DELETE_SELF on the
        // directory, which notify may tag differently.
        let key = mask - EventMask::ISDIR;
        let twin = self.echoes.iter().position(|(p, m)| p == path && *m == key);

        match twin {
            Some(at) => {
                self.echoes.remove(at);
                self.translate_self(path, mask, batch);
            }
            None => {
                if self.echoes.len() >= MAX_ECHOES {
                    self.echoes.remove(0);
                }
                self.echoes.push((path.to_path_buf(), key));
                self.translate_child(path, mask, batch);
            }
        }
    }

    /// An event on an entry inside a watched directory.
    fn translate_child(&self, path: &Path, mask: EventMask, batch: &mut KernelBatch) {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return;
        };
        let Some(ids) = self.dirs.get(parent) else {
            return;
        };

        let name = name.to_string_lossy();
        for id in ids {
            let Some(target) = self.targets.get(id) else {
                continue;
            };
            if target.filename.as_deref().is_none_or(|f| f == name) {
                batch.events.push(KernelEvent {
                    subscription: *id,
                    mask,
                    name: Some(name.to_string()),
                });
            }
        }
    }
}

impl KernelWatch for NotifyKernel {
    fn init(&mut self, queue: Sender<RawEvent>) -> bool {
        match Self::create_watcher(queue) {
            Ok(watcher) => {
                self.watcher = Some(watcher);
                crate::debug_event!("kernel", "initialized");
                true
            }
            Err(e) => {
                tracing::warn!("[kernel] {e}");
                false
            }
        }
    }

    fn start_watching(&mut self, id: SubscriptionId, target: &WatchTarget) -> bool {
        if self.targets.contains_key(&id) {
            return true;
        }

        let dir = watch_dir_of(target);
        if !self.dirs.contains_key(&dir) {
            if let Err(e) = self.watch_dir(&dir) {
                crate::debug_event!("kernel", "unwatchable", "{e}");
                return false;
            }
        }

        self.dirs.entry(dir).or_default().push(id);
        self.targets.insert(id, target.clone());
        true
    }

    fn stop_watching(&mut self, id: SubscriptionId) {
        let Some(target) = self.targets.remove(&id) else {
            return;
        };

        let dir = watch_dir_of(&target);
        let now_empty = match self.dirs.get_mut(&dir) {
            Some(ids) => {
                ids.retain(|other| *other != id);
                ids.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.dirs.remove(&dir);
            self.echoes.retain(|(p, _)| *p != dir);
            self.unwatch_dir(&dir);
        }
    }

    fn translate(&mut self, raw: &Event) -> KernelBatch {
        let mut batch = KernelBatch::default();

        if raw.need_rescan() {
            tracing::warn!("[kernel] event queue overflowed, some changes were lost");
        }

        for path in &raw.paths {
            let mask = event_mask(&raw.kind, path);
            if mask.is_empty() {
                continue;
            }

            let watched = self.dirs.contains_key(path);
            let in_watched = path.parent().is_some_and(|p| self.dirs.contains_key(p));
            match (watched, in_watched) {
                (true, true) => self.translate_nested(path, mask, &mut batch),
                (true, false) => self.translate_self(path, mask, &mut batch),
                (false, _) => self.translate_child(path, mask, &mut batch),
            }
        }

        batch
    }
}

/// Map a `notify` event kind to inotify-style mask bits.
///
/// Paired renames arrive as separate `From` and `To` events as well, so
/// the combined `Both` event maps to nothing.
fn event_mask(kind: &EventKind, path: &Path) -> EventMask {
    match kind {
        EventKind::Access(AccessKind::Open(_)) => EventMask::OPEN,
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => EventMask::CLOSE_WRITE,
        EventKind::Access(AccessKind::Close(_)) => EventMask::CLOSE_NOWRITE,
        EventKind::Access(_) => EventMask::ACCESS,
        EventKind::Create(CreateKind::Folder) => EventMask::CREATE | EventMask::ISDIR,
        EventKind::Create(_) => EventMask::CREATE,
        EventKind::Modify(ModifyKind::Metadata(_)) => EventMask::ATTRIB,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => EventMask::MOVED_FROM,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => EventMask::MOVED_TO,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => EventMask::empty(),
        EventKind::Modify(ModifyKind::Name(_)) => {
            if path.exists() {
                EventMask::MOVED_TO
            } else {
                EventMask::MOVED_FROM
            }
        }
        EventKind::Modify(_) => EventMask::MODIFY,
        EventKind::Remove(RemoveKind::Folder) => EventMask::DELETE | EventMask::ISDIR,
        EventKind::Remove(_) => EventMask::DELETE,
        EventKind::Any | EventKind::Other => EventMask::empty(),
    }
}
