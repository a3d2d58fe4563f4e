// mesh-crypto/src/keypair.rs

use crate::{CryptoError, CryptoResult, Hash, HashAlgorithm, Hashable};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ADDRESS_SIZE: usize = 20;

/// Ed25519 verifying key of a validator or host
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into()
            .map_err(|_| CryptoError::InvalidLength { expected: PUBLIC_KEY_LENGTH, got: bytes.len() })?;
        VerifyingKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.0.to_bytes()
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(self)
    }

    /// Check a signature produced by [`KeyPair::sign`]
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> CryptoResult<()> {
        let signature = ed25519_dalek::Signature::from_slice(signature)
            .map_err(|_| CryptoError::InvalidSignature)?;
        self.0.verify(message, &signature)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.to_bytes()[..8]))
    }
}

/// Identity of a validator: signing key plus the values derived from it
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Deterministic identity, for fixtures and simulations
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key())
    }

    pub fn address(&self) -> Address {
        self.public_key().address()
    }

    /// Fingerprint of the device holding the key. One device, one validator.
    pub fn device_fingerprint(&self) -> Hash {
        self.public_key().to_bytes().hash_with(HashAlgorithm::Blake3)
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// Hop attestation: digest of the signature over `message`
    pub fn attest(&self, message: &[u8]) -> Hash {
        self.sign(message).hash_with(HashAlgorithm::Sha3_256)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// 20-byte account identity, shown as `0x`-prefixed hex
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    pub fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Trailing 20 bytes of the SHA-256 of the key
    pub fn from_public_key(key: &PublicKey) -> Self {
        let digest = key.to_bytes().hash();
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(&digest.as_bytes()[HASH_SIZE_OFFSET..]);
        Self(bytes)
    }

    /// Address holding `n` in its low bytes
    pub fn from_low_u64(n: u64) -> Self {
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes[ADDRESS_SIZE - 8..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

const HASH_SIZE_OFFSET: usize = crate::hash::HASH_SIZE - ADDRESS_SIZE;

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        let bytes: [u8; ADDRESS_SIZE] = bytes.as_slice().try_into()
            .map_err(|_| CryptoError::InvalidLength { expected: ADDRESS_SIZE, got: bytes.len() })?;
        Ok(Self(bytes))
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_hex()
    }
}

impl TryFrom<String> for Address {
    type Error = CryptoError;

    fn try_from(s: String) -> CryptoResult<Self> {
        s.parse()
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generated_identities_differ() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.address(), b.address());
        assert_ne!(a.device_fingerprint(), b.device_fingerprint());
    }

    #[test]
    fn test_seeded_identity_is_deterministic() {
        let a = KeyPair::from_seed([7u8; 32]);
        let b = KeyPair::from_seed([7u8; 32]);
        assert_eq!(a.address(), b.address());
        assert_eq!(a.device_fingerprint(), b.device_fingerprint());
        assert_eq!(a.attest(b"proof/0"), b.attest(b"proof/0"));
        assert_ne!(a.attest(b"proof/0"), a.attest(b"proof/1"));
    }

    #[test]
    fn test_fingerprint_is_not_the_address_digest() {
        let kp = KeyPair::from_seed([3u8; 32]);
        let sha = kp.public_key().to_bytes().hash();
        assert_ne!(kp.device_fingerprint(), sha);
        assert_eq!(&sha.as_bytes()[12..], kp.address().as_bytes());
    }

    #[test]
    fn test_signature_verifies_only_for_its_message() {
        let kp = KeyPair::from_seed([5u8; 32]);
        let signature = kp.sign(b"hop 2");
        let key = PublicKey::from_bytes(&kp.public_key().to_bytes()).unwrap();

        assert!(key.verify(b"hop 2", &signature).is_ok());
        assert_eq!(key.verify(b"hop 3", &signature), Err(CryptoError::InvalidSignature));
        assert_eq!(key.verify(b"hop 2", &signature[..10]), Err(CryptoError::InvalidSignature));
    }

    #[test]
    fn test_public_key_length_checked() {
        assert_eq!(
            PublicKey::from_bytes(&[1, 2]).unwrap_err(),
            CryptoError::InvalidLength { expected: 32, got: 2 }
        );
    }

    #[test]
    fn test_address_text_forms() {
        let address = Address::from_low_u64(42);
        assert_eq!(address.to_hex().parse::<Address>().unwrap(), address);
        assert_eq!(address.as_bytes()[19], 42);

        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{}\"", address));
        assert_eq!(serde_json::from_str::<Address>(&json).unwrap(), address);
        assert!("0x1234".parse::<Address>().is_err());
    }

    proptest! {
        #[test]
        fn prop_signature_binds_key_and_message(
            seed in any::<[u8; 32]>(),
            message in proptest::collection::vec(any::<u8>(), 0..256),
            flip in any::<usize>(),
        ) {
            let kp = KeyPair::from_seed(seed);
            let signature = kp.sign(&message);
            prop_assert!(kp.public_key().verify(&message, &signature).is_ok());

            let mut tampered = signature.clone();
            let at = flip % tampered.len();
            tampered[at] ^= 0x01;
            prop_assert!(kp.public_key().verify(&message, &tampered).is_err());
        }

        #[test]
        fn prop_attestation_tracks_message(seed in any::<[u8; 32]>(), a in any::<u64>(), b in any::<u64>()) {
            prop_assume!(a != b);
            let kp = KeyPair::from_seed(seed);
            prop_assert_ne!(kp.attest(&a.to_be_bytes()), kp.attest(&b.to_be_bytes()));
        }
    }
}
