//! Validator identities and the signing interface.
use std::fmt;

use anyhow::Context as _;
use ed25519_dalek as ed;
use ed25519_dalek::{Signer as _, Verifier as _};

/// Identity of a validator, as it appears in the chain configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValidatorId(pub String);

impl ValidatorId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty id (used by the genesis block).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ValidatorId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

impl From<&str> for ValidatorId {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

/// Signature produced by a [`Signer`]. The byte format depends on the signer.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Signature(pub Vec<u8>);

impl fmt::Debug for Signature {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "signature:{}", hex::encode(&self.0))
    }
}

/// Signs outbound consensus messages on behalf of the local validator.
pub trait Signer: Send + Sync + fmt::Debug {
    /// Identity of the local validator.
    fn id(&self) -> &ValidatorId;
    /// Signs the given bytes.
    fn sign(&self, msg: &[u8]) -> anyhow::Result<Signature>;
}

/// ed25519 secret key.
pub struct SecretKey(ed::SigningKey);

impl SecretKey {
    /// Generates a secret key from a cryptographically-secure entropy source.
    pub fn generate() -> Self {
        Self(ed::SigningKey::generate(&mut rand::rngs::OsRng {}))
    }

    /// Signs a message.
    pub fn sign(&self, msg: &[u8]) -> Signature {
        Signature(self.0.sign(msg).to_bytes().to_vec())
    }

    /// Computes a public key for this secret key.
    pub fn public(&self) -> PublicKey {
        PublicKey(ed::VerifyingKey::from(&self.0))
    }

    /// Parses a secret key from its 32 raw bytes.
    pub fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        let bytes: &ed::SecretKey = bytes.try_into().context("invalid key length")?;
        Ok(Self(ed::SigningKey::from_bytes(bytes)))
    }
}

impl Clone for SecretKey {
    fn clone(&self) -> Self {
        Self(ed::SigningKey::from_bytes(&self.0.to_bytes()))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        // We don't want to accidentally leak the secret key.
        write!(fmt, "<secret for {:?}>", self.public())
    }
}

/// ed25519 public key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(ed::VerifyingKey);

impl PublicKey {
    /// Verifies a signature of a message against this public key.
    pub fn verify(&self, msg: &[u8], sig: &Signature) -> anyhow::Result<()> {
        let sig: &[u8; ed::SIGNATURE_LENGTH] = sig
            .0
            .as_slice()
            .try_into()
            .context("invalid signature length")?;
        self.0
            .verify(msg, &ed::Signature::from_bytes(sig))
            .context("invalid signature")
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "validator:public:ed25519:{}", hex::encode(self.0.as_bytes()))
    }
}

/// [`Signer`] backed by an in-process ed25519 key.
#[derive(Debug, Clone)]
pub struct LocalSigner {
    id: ValidatorId,
    key: SecretKey,
}

impl LocalSigner {
    /// Constructs a signer for the validator `id`.
    pub fn new(id: ValidatorId, key: SecretKey) -> Self {
        Self { id, key }
    }

    /// Public key matching the signer's secret key.
    pub fn public(&self) -> PublicKey {
        self.key.public()
    }
}

impl Signer for LocalSigner {
    fn id(&self) -> &ValidatorId {
        &self.id
    }

    fn sign(&self, msg: &[u8]) -> anyhow::Result<Signature> {
        Ok(self.key.sign(msg))
    }
}
