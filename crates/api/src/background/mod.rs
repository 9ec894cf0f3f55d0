//! Long-running maintenance tasks spawned by the API binary.

pub mod result_retention;
