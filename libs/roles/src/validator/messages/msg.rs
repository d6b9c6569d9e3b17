//! Signed messages.
use anyhow::Context as _;
use tbft_utils::enum_util::{BadVariantError, Variant};

use super::ConsensusMsg;
use crate::validator::{PublicKey, Signature, Signer, ValidatorId};

/// Strongly typed signed message.
/// WARNING: signature is not guaranteed to be valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signed<V: Variant<ConsensusMsg>> {
    /// The message that was signed.
    pub msg: V,
    /// The validator which signed the message.
    pub signer: ValidatorId,
    /// The signature.
    pub sig: Signature,
}

/// Bytes which get signed for the message.
pub fn signing_bytes(msg: &ConsensusMsg) -> Vec<u8> {
    tbft_protobuf::encode(msg)
}

/// Signs a message with the given signer.
pub fn sign_msg<V: Variant<ConsensusMsg> + Clone>(
    signer: &dyn Signer,
    msg: V,
) -> anyhow::Result<Signed<V>> {
    let sig = signer
        .sign(&signing_bytes(&msg.clone().insert()))
        .context("sign()")?;
    Ok(Signed {
        msg,
        signer: signer.id().clone(),
        sig,
    })
}

impl<V: Variant<ConsensusMsg> + Clone> Signed<V> {
    /// Verify the signature on the message.
    pub fn verify(&self, key: &PublicKey) -> anyhow::Result<()> {
        key.verify(&signing_bytes(&self.msg.clone().insert()), &self.sig)
    }
}

impl<V: Variant<ConsensusMsg>> Signed<V> {
    /// Casts a signed message variant to sub/super variant.
    /// It is an equivalent of constructing/deconstructing enum values.
    pub fn cast<U: Variant<ConsensusMsg>>(self) -> Result<Signed<U>, BadVariantError> {
        Ok(Signed {
            msg: U::extract(self.msg.insert())?,
            signer: self.signer,
            sig: self.sig,
        })
    }

    /// Embeds the message into a [`ConsensusMsg`]. Never fails, unlike [`Signed::cast`].
    pub fn upcast(self) -> Signed<ConsensusMsg> {
        Signed {
            msg: self.msg.insert(),
            signer: self.signer,
            sig: self.sig,
        }
    }
}
