//! This crate provides the types shared by the participants of the TBFT protocol.
//!
//! The only role modeled here is `Validator`: a node that participates in the
//! consensus protocol, so it proposes blocks and votes for them. Every
//! validator is identified by a [`validator::ValidatorId`] and belongs to a
//! [`validator::ValidatorSet`] that is fixed for the duration of a height.

pub mod proto;
pub mod validator;
