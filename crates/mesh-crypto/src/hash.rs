// mesh-crypto/src/hash.rs

use crate::{CryptoError, CryptoResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sha3::Sha3_256;
use std::fmt;
use std::str::FromStr;

pub const HASH_SIZE: usize = 32;

/// Digest functions available to the engine.
///
/// Identifiers and addresses use SHA-256, device fingerprints BLAKE3 and
/// signed attestations SHA3-256, so values from different domains never
/// coincide even over the same input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha3_256,
    Blake3,
}

impl HashAlgorithm {
    pub fn digest(self, data: &[u8]) -> Hash {
        match self {
            HashAlgorithm::Sha256 => Hash(Sha256::digest(data).into()),
            HashAlgorithm::Sha3_256 => Hash(Sha3_256::digest(data).into()),
            HashAlgorithm::Blake3 => Hash(*blake3::hash(data).as_bytes()),
        }
    }
}

/// 32-byte digest: transaction hashes, proof and request ids, hop
/// attestations, device fingerprints. Serialized as hex.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; HASH_SIZE] = slice.try_into()
            .map_err(|_| CryptoError::InvalidLength { expected: HASH_SIZE, got: slice.len() })?;
        Ok(Self(bytes))
    }

    /// SHA-256 over the concatenation of `parts`
    pub fn of_parts(parts: &[&[u8]]) -> Self {
        let hasher = parts.iter().fold(Sha256::new(), |h, part| h.chain_update(part));
        Self(hasher.finalize().into())
    }

    /// Empty hop slot marker
    pub fn zero() -> Self {
        Self([0; HASH_SIZE])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Leading eight bytes, big-endian
    pub fn to_u64(&self) -> u64 {
        let (head, _) = self.0.split_at(8);
        head.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Hash {
    type Err = CryptoError;

    /// Accepts an optional `0x` prefix
    fn from_str(s: &str) -> CryptoResult<Self> {
        let digits = s.trim_start_matches("0x");
        let bytes = hex::decode(digits).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "Hash({}..{})", &hex[..8], &hex[56..])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<Hash> for String {
    fn from(hash: Hash) -> Self {
        hash.to_hex()
    }
}

impl TryFrom<String> for Hash {
    type Error = CryptoError;

    fn try_from(s: String) -> CryptoResult<Self> {
        s.parse()
    }
}

/// Anything viewable as bytes can be digested
pub trait Hashable {
    fn hash_with(&self, algorithm: HashAlgorithm) -> Hash;

    fn hash(&self) -> Hash {
        self.hash_with(HashAlgorithm::default())
    }
}

impl<T: AsRef<[u8]> + ?Sized> Hashable for T {
    fn hash_with(&self, algorithm: HashAlgorithm) -> Hash {
        algorithm.digest(self.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithms_disagree() {
        let data = b"hop attestation";
        let sha256 = data.hash_with(HashAlgorithm::Sha256);
        let sha3 = data.hash_with(HashAlgorithm::Sha3_256);
        let blake3 = data.hash_with(HashAlgorithm::Blake3);

        assert_ne!(sha256, sha3);
        assert_ne!(sha256, blake3);
        assert_ne!(sha3, blake3);
        assert_eq!(data.hash(), sha256);
    }

    #[test]
    fn test_of_parts_matches_concatenation() {
        let joined = b"callertimeentropy".hash();
        let parts = Hash::of_parts(&[&b"caller"[..], b"time", b"entropy"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn test_zero_marks_empty_slot() {
        assert!(Hash::zero().is_zero());
        assert!(!"proof".hash().is_zero());
    }

    #[test]
    fn test_parse_accepts_prefix() {
        let hash = b"tx".hash();
        assert_eq!(format!("0x{}", hash).parse::<Hash>().unwrap(), hash);
        assert_eq!(hash.to_hex().parse::<Hash>().unwrap(), hash);
        assert_eq!(
            "abcd".parse::<Hash>().unwrap_err(),
            CryptoError::InvalidLength { expected: 32, got: 2 }
        );
        assert!(matches!("zz".parse::<Hash>(), Err(CryptoError::InvalidHex(_))));
    }

    #[test]
    fn test_to_u64_is_big_endian_prefix() {
        let mut bytes = [0u8; HASH_SIZE];
        bytes[6] = 1;
        bytes[7] = 5;
        bytes[8] = 0xff;
        assert_eq!(Hash::new(bytes).to_u64(), 261);
    }
}
