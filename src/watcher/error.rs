//! Error types for the subscription registry.

use std::path::PathBuf;
use thiserror::Error;

use super::subscription::SubscriptionId;

/// Errors from registry and watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize kernel watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Subscription {id} for {path} is already registered")]
    DuplicateSubscription { id: SubscriptionId, path: String },

    #[error("Subscription {id} was cancelled and cannot be added again")]
    SubscriptionCancelled { id: SubscriptionId },

    #[error("Failed to load config: {reason}")]
    Config { reason: String },
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

impl From<figment::Error> for WatchError {
    fn from(e: figment::Error) -> Self {
        WatchError::Config {
            reason: e.to_string(),
        }
    }
}
