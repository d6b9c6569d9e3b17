//! Messages exchanged by the validators.

mod block;
mod consensus;
mod msg;

pub use block::*;
pub use consensus::*;
pub use msg::*;
