//! Test-only utilities.
mod in_memory;

pub use in_memory::{Engine, PayloadManager};
