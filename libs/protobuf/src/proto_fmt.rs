//! Conversion between strongly typed structs and their protobuf representation.
//!
//! All fields of the wire messages are declared with explicit presence
//! (`optional` or `repeated`), so that a missing field can be told apart from
//! a field set to its default value. Conversions from the wire representation
//! are fallible, conversions into it are not.
use anyhow::Context as _;
use prost::Message as _;

/// Strongly typed value with a protobuf wire representation.
pub trait ProtoFmt: Sized {
    /// Wire message.
    type Proto: prost::Message + Default;
    /// Validates and converts the wire message.
    fn read(r: &Self::Proto) -> anyhow::Result<Self>;
    /// Builds the wire message.
    fn build(&self) -> Self::Proto;
}

/// Serializes `x` into bytes.
pub fn encode<T: ProtoFmt>(x: &T) -> Vec<u8> {
    x.build().encode_to_vec()
}

/// Deserializes and validates a `T`.
pub fn decode<T: ProtoFmt>(bytes: &[u8]) -> anyhow::Result<T> {
    let proto = T::Proto::decode(bytes).context("malformed message")?;
    T::read(&proto)
}

/// Reads a nested message which has to be present.
pub fn read_required<T: ProtoFmt>(field: &Option<T::Proto>) -> anyhow::Result<T> {
    T::read(required(field)?)
}

/// Unwraps a field which has to be present.
pub fn required<T>(field: &Option<T>) -> anyhow::Result<&T> {
    field.as_ref().context("missing field")
}
