//! Client for the external image generation service.
//!
//! [`ImageGenerator`] is the seam the worker calls through; [`FalClient`]
//! implements it against fal.ai's queue REST API (submit, poll status,
//! fetch result).

pub mod client;
pub mod generator;

pub use client::{FalClient, FalConfig, QueueStatus, QueueSubmission};
pub use generator::{FalError, ImageGenerator};
