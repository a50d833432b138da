pub mod config;
pub mod logging;
pub mod watcher;

pub use config::{LoggingConfig, Settings, WatcherConfig};
pub use watcher::{
    ChannelHandler, EventMask, Notification, Registry, Subscription, SubscriptionHandler,
    WatchError,
};
