// mesh-crypto/src/lib.rs

//! Identity and digest primitives for the hop-mesh engine
//!
//! - `Hash`: 32-byte digests under SHA-256, SHA3-256 or BLAKE3
//! - `Address`: 20-byte account identities
//! - `KeyPair`: Ed25519 validator keys, device fingerprints and hop attestations

pub mod hash;
pub mod keypair;

pub use hash::{Hash, HashAlgorithm, Hashable};
pub use keypair::{Address, KeyPair, PublicKey};

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("Expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Signature does not verify")]
    InvalidSignature,
}
