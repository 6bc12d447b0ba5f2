//! Cryptographic identity for pool callers
//!
//! This module provides:
//! - Ed25519 key pair generation, signing, and verification
//! - Address derivation from verifying keys
//! - SHA-256 hashing for snapshot integrity

use crate::{
    types::Address,
    Error, Result,
};
use hex::FromHex;
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Ed25519 signature (64 bytes)
///
/// Hex string in human-readable formats, raw bytes otherwise.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 64]);

impl Signature {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(self.0))
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let bytes = if deserializer.is_human_readable() {
            let encoded = String::deserialize(deserializer)?;
            hex::decode(encoded.strip_prefix("0x").unwrap_or(&encoded)).map_err(serde::de::Error::custom)?
        } else {
            Vec::<u8>::deserialize(deserializer)?
        };
        let bytes: [u8; 64] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| serde::de::Error::invalid_length(b.len(), &"64 bytes"))?;
        Ok(Self(bytes))
    }
}

/// Ed25519 key pair for signing
#[derive(Debug)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Create from seed (32 bytes) - deterministic generation
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Create from a 64-character hex seed
    pub fn from_seed_hex(seed: &str) -> Result<Self> {
        let seed = <[u8; 32]>::from_hex(seed.strip_prefix("0x").unwrap_or(seed))
            .map_err(|e| Error::Config(format!("Signing seed must be 32 hex bytes: {}", e)))?;
        Ok(Self::from_seed(&seed))
    }

    /// Get public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Address controlled by this key
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key())
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature::from_bytes(self.signing_key.sign(message).to_bytes())
    }
}

/// Verify `signature` over `message`, returning the signer's address
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &[u8; 32]) -> Result<Address> {
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| Error::InvalidSignature(format!("invalid public key: {}", e)))?;
    let dalek_sig = DalekSignature::from_bytes(signature.as_bytes());

    verifying_key
        .verify(message, &dalek_sig)
        .map_err(|e| Error::InvalidSignature(format!("verification failed: {}", e)))?;

    Ok(Address::from_public_key(public_key))
}

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_from_seed() {
        let seed = [42u8; 32];
        let keypair1 = KeyPair::from_seed(&seed);
        let keypair2 = KeyPair::from_seed(&seed);

        assert_eq!(keypair1.public_key(), keypair2.public_key());
        assert_eq!(keypair1.address(), keypair2.address());
    }

    #[test]
    fn test_seed_hex() {
        let keypair = KeyPair::from_seed_hex(&"2a".repeat(32)).unwrap();
        assert_eq!(keypair.public_key(), KeyPair::from_seed(&[42u8; 32]).public_key());
        assert!(matches!(KeyPair::from_seed_hex("2a2a"), Err(Error::Config(_))));
    }

    #[test]
    fn test_sign_and_verify_yields_address() {
        let keypair = KeyPair::generate();
        let message = b"withdraw 10 nonce 0";

        let signature = keypair.sign(message);
        let signer = verify_signature(message, &signature, &keypair.public_key()).unwrap();
        assert_eq!(signer, keypair.address());

        assert!(verify_signature(b"withdraw 11 nonce 0", &signature, &keypair.public_key()).is_err());

        let other = KeyPair::generate();
        assert!(verify_signature(message, &signature, &other.public_key()).is_err());
    }

    #[test]
    fn test_signature_serde() {
        let signature = KeyPair::from_seed(&[1u8; 32]).sign(b"payload");

        let json = serde_json::to_string(&signature).unwrap();
        assert_eq!(json.len(), 128 + 2);
        assert_eq!(serde_json::from_str::<Signature>(&json).unwrap(), signature);

        let bytes = bincode::serialize(&signature).unwrap();
        assert_eq!(bincode::deserialize::<Signature>(&bytes).unwrap(), signature);
    }

    #[test]
    fn test_hash_bytes() {
        let hash1 = hash_bytes(b"test data");
        assert_eq!(hash1, hash_bytes(b"test data"));
        assert_ne!(hash1, hash_bytes(b"different data"));
    }

    #[test]
    fn test_known_signature_vector() {
        // RFC 8032 test vector 1
        let seed = [
            0x9d, 0x61, 0xb1, 0x9d, 0xef, 0xfd, 0x5a, 0x60,
            0xba, 0x84, 0x4a, 0xf4, 0x92, 0xec, 0x2c, 0xc4,
            0x44, 0x49, 0xc5, 0x69, 0x7b, 0x32, 0x69, 0x19,
            0x70, 0x3b, 0xac, 0x03, 0x1c, 0xae, 0x7f, 0x60,
        ];

        let keypair = KeyPair::from_seed(&seed);
        assert_eq!(
            hex::encode(keypair.public_key()),
            "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a"
        );
        let signature = keypair.sign(b"");
        assert!(verify_signature(b"", &signature, &keypair.public_key()).is_ok());
    }
}
