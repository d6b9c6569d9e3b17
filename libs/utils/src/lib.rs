//! Crate that holds several small utilities and primitives.

pub mod bus;
pub mod enum_util;
