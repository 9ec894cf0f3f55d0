//! Generation worker: pulls jobs from the queue, calls the external
//! generator, and records every outcome in the result store.
//!
//! Failure visibility belongs to the worker. Generator errors and deadline
//! overruns become failure records and the job is acknowledged; the queue
//! only retries attempts that left no record behind (store write errors,
//! panics, crashed processes). When the queue gives up, the worker writes
//! a terminal failure record so no client is left pending forever.

pub mod config;
pub mod executor;
pub mod pool;
pub mod shutdown;
pub mod telemetry;

pub use config::WorkerConfig;
pub use executor::{ExecuteError, GenerationExecutor};
pub use pool::{process_next, AttemptOutcome, WorkerPool};
