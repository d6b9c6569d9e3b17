//! Protobuf serialization helpers.
//!
//! Wire types are plain `prost` messages; the [`ProtoFmt`] trait maps them to
//! the strongly typed domain structs.

mod proto_fmt;
pub mod testonly;

pub use proto_fmt::*;

#[cfg(test)]
mod tests;
