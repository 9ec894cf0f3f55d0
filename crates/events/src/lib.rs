//! Job completion events.
//!
//! A worker that has written a result record announces it with a
//! [`ResultReady`] event through a [`CompletionSink`]. Inside one process the
//! sink is the [`CompletionBus`]; across processes the database crate relays
//! events through PostgreSQL notifications onto the API's bus.

pub mod bus;

pub use bus::{CompletionBus, CompletionSink, EventError, ResultReady};
