//! Domain types and storage contracts for the image generation queue.
//!
//! Lives at the bottom of the workspace dependency graph: no internal
//! crate dependencies, only the vocabulary every other crate shares.
//!
//! - [`generation`] -- generation requests, jobs, and the argument payload
//!   sent to the external generator.
//! - [`result`] -- the stored outcome of a job and its key/TTL contract.
//! - [`store`] -- the expiring [`ResultStore`](store::ResultStore) contract.
//! - [`queue`] -- the at-least-once [`JobQueue`](queue::JobQueue) contract.

pub mod config;
pub mod error;
pub mod generation;
pub mod queue;
pub mod result;
pub mod store;
pub mod types;
