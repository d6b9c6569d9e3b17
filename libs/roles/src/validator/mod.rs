//! Validator role implementation.

mod conv;
mod keys;
mod messages;
pub mod testonly;
#[cfg(test)]
mod tests;
mod validator_set;

pub use self::{keys::*, messages::*, validator_set::*};
