//! Module defining a trait which allows for implementing code,
//! which is generic over the variants of an enum type.

/// Error returned when `Variant::extract` fails.
#[derive(Debug, thiserror::Error)]
#[error("bad enum variant")]
pub struct BadVariantError;

/// `impl Variant<E> for A` defines an embedding of `A` in `E`.
/// For example for
/// ```ignore
/// enum Msg {
///   Proposal(Proposal),
///   Prevote(Vote),
///   Precommit(Vote),
/// }
/// ```
/// `Proposal` embeds into a single variant, while `Vote` embeds into
/// two of them (the variant is picked from the vote's own type):
/// ```ignore
/// impl Variant<Msg> for Vote {
///   fn insert(self) -> Msg {
///     match self.vote_type {
///       VoteType::Prevote => Msg::Prevote(self),
///       VoteType::Precommit => Msg::Precommit(self),
///     }
///   }
///   fn extract(msg: Msg) -> Result<Self, BadVariantError> {
///     match msg {
///       Msg::Prevote(v) | Msg::Precommit(v) => Ok(v),
///       _ => Err(BadVariantError),
///     }
///   }
/// }
/// ```
///
/// It works just like `#[from]` in `thiserror::Error`, but additionally
/// provides a method to extract the embedded value.
/// We require that `A::extract(a.insert()) == a`.
pub trait Variant<Enum: Sized>: Sized {
    /// Constructs an enum value from a value of its variant.
    fn insert(self) -> Enum;
    /// Destructs the enum value expecting a particular variant.
    fn extract(e: Enum) -> Result<Self, BadVariantError>;
}
