//! Result push delivery.
//!
//! [`Notifier`] is a single task owning the [`WatchSet`] and the
//! [`ConnectionRegistry`](crate::ws::ConnectionRegistry). Handlers and
//! socket tasks talk to it through a [`NotifierHandle`]. It wakes on
//! completion events and on a fixed poll tick that catches anything the
//! events missed.

pub mod notifier;
pub mod watch_set;

pub use notifier::{
    result_ready_message, Notifier, NotifierConfig, NotifierHandle, NotifierStats,
    NotifierStopped,
};
pub use watch_set::WatchSet;
