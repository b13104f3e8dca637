//! BLS12-381 key material for staking pool entries.
//!
//! Pool holders are identified by a 48-byte compressed G1 public key. A new
//! entry must prove possession of the matching secret key with a signature
//! over the public key bytes, preventing rogue-key aggregation attacks on
//! the vote-aggregation layer.
//!
//! Messages are mapped to G2 by hashing to a scalar and multiplying the
//! generator, so verification is a two-pairing equality check:
//! `e(g1, sig) == e(pk, H(m))`.

use crate::CryptoError;
use bls12_381::{G1Affine, G1Projective, G2Affine, G2Projective, Scalar, pairing};
use sha2::Digest as _;

pub const PUBKEY_LENGTH: usize = 48;
pub const SIGNATURE_LENGTH: usize = 96;

/// Domain separation prefix for proof-of-possession messages.
const POP_DOMAIN: &[u8] = b"EMBER_BLS_POP_";

fn hash_to_scalar(msg: &[u8]) -> Scalar {
    let mut wide = [0u8; 64];
    let lo = sha2::Sha256::new()
        .chain_update([0u8])
        .chain_update(POP_DOMAIN)
        .chain_update(msg)
        .finalize();
    let hi = sha2::Sha256::new()
        .chain_update([1u8])
        .chain_update(POP_DOMAIN)
        .chain_update(msg)
        .finalize();
    wide[..32].copy_from_slice(&lo);
    wide[32..].copy_from_slice(&hi);
    Scalar::from_bytes_wide(&wide)
}

fn message_point(msg: &[u8]) -> G2Projective {
    G2Projective::generator() * hash_to_scalar(msg)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(G1Affine);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(G2Affine);

/// Secret key, used by node operators to produce the proof of possession
/// embedded in a staking summary.
#[derive(Debug, Clone)]
pub struct SecretKey(Scalar);

impl PublicKey {
    /// Deserializes a compressed G1 point. The identity is rejected, since
    /// it would validate any signature.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: &[u8; PUBKEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidInput("public key must be 48 bytes"))?;
        let point = G1Affine::from_compressed(raw)
            .into_option()
            .ok_or(CryptoError::InvalidKey)?;
        if bool::from(point.is_identity()) {
            return Err(CryptoError::InvalidKey);
        }
        Ok(PublicKey(point))
    }

    pub fn to_bytes(&self) -> [u8; PUBKEY_LENGTH] {
        self.0.to_compressed()
    }
}

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: &[u8; SIGNATURE_LENGTH] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidInput("signature must be 96 bytes"))?;
        let point = G2Affine::from_compressed(raw)
            .into_option()
            .ok_or(CryptoError::InvalidSignature)?;
        Ok(Signature(point))
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        self.0.to_compressed()
    }

    pub fn is_identity(&self) -> bool {
        bool::from(self.0.is_identity())
    }

    /// Proof-of-possession check: this signature must be a valid signature
    /// over `pubkey`'s own serialized bytes.
    pub fn pop_verify(&self, pubkey: &PublicKey) -> bool {
        if self.is_identity() {
            return false;
        }
        let hashed = G2Affine::from(message_point(&pubkey.to_bytes()));
        pairing(&G1Affine::generator(), &self.0) == pairing(&pubkey.0, &hashed)
    }
}

impl SecretKey {
    /// Derives a secret key deterministically from seed bytes.
    pub fn from_seed(seed: &[u8]) -> Self {
        SecretKey(hash_to_scalar(seed))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(G1Affine::from(G1Projective::generator() * self.0))
    }

    /// Signs this key's own public key bytes, producing the proof of
    /// possession that [`Signature::pop_verify`] checks.
    pub fn sign_pop(&self) -> Signature {
        let message = message_point(&self.public_key().to_bytes());
        Signature(G2Affine::from(message * self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_pubkey_is_rejected() {
        let identity = G1Affine::identity().to_compressed();
        assert_eq!(
            PublicKey::from_bytes(&identity),
            Err(CryptoError::InvalidKey)
        );
    }

    #[test]
    fn malformed_lengths_are_rejected() {
        assert!(PublicKey::from_bytes(&[0u8; 47]).is_err());
        assert!(Signature::from_bytes(&[0u8; 95]).is_err());
    }

    #[test]
    fn pop_round_trip_verifies() {
        let sk = SecretKey::from_seed(b"pool operator 1");
        let pk = sk.public_key();
        let pop = sk.sign_pop();
        assert!(pop.pop_verify(&pk));
    }

    #[test]
    fn pop_from_wrong_key_fails() {
        let sk = SecretKey::from_seed(b"pool operator 1");
        let other = SecretKey::from_seed(b"pool operator 2");
        assert!(!sk.sign_pop().pop_verify(&other.public_key()));
    }

    #[test]
    fn identity_signature_never_verifies() {
        let pk = SecretKey::from_seed(b"x").public_key();
        let sig = Signature(G2Affine::identity());
        assert!(!sig.pop_verify(&pk));
    }

    #[test]
    fn signature_round_trips_through_bytes() {
        let pop = SecretKey::from_seed(b"seed").sign_pop();
        let restored = Signature::from_bytes(&pop.to_bytes()).expect("valid signature");
        assert_eq!(pop, restored);
    }
}
