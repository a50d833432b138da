//! Subscription registry for kernel change notifications.
//!
//! This module keeps the table of active subscriptions and turns kernel
//! events and "path became available" signals into full paths for the
//! caller's handler.
//!
//! # Architecture
//!
//! ```text
//! Registry (one lock)
//!   - subscription table
//!   - KernelWatch    (NotifyKernel)      <- kernel reader thread
//!   - MissingPaths   (PollingMissing)    <- rescan thread
//!   - Diagnostics    (TracingDiagnostics)
//!         |
//!   SubscriptionHandler::on_event / on_found
//! ```

mod backend;
mod diagnostics;
mod error;
mod handler;
mod kernel;
mod mask;
mod missing;
mod registry;
mod subscription;

pub use backend::{
    Diagnostics, KernelBatch, KernelEvent, KernelWatch, MissingPaths, RawEvent, RegistryStats,
};
pub use diagnostics::TracingDiagnostics;
pub use error::WatchError;
pub use handler::{ChannelHandler, Notification, SubscriptionHandler};
pub use kernel::NotifyKernel;
pub use mask::EventMask;
pub use missing::PollingMissing;
pub use registry::{Registry, RegistryBuilder};
pub use subscription::{Subscription, SubscriptionId, WatchTarget};
