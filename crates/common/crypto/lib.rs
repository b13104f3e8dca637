//! Cryptographic primitives for the Ember execution engine.
//!
//! Covers the hash functions and signature schemes the engine meters as
//! precompiles (keccak-256, sha-256, ripemd-160, secp256k1 recovery, BN254
//! curve operations) plus the BLS12-381 proof-of-possession check the
//! staking bridge performs on new pool entries.

pub mod bls;
pub mod bn254;

use ethereum_types::{Address, H256};
use sha2::Digest as _;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid recovery id")]
    InvalidRecoveryId,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("public key recovery failed")]
    RecoveryFailed,
    #[error("invalid point: {0}")]
    InvalidPoint(&'static str),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("invalid key material")]
    InvalidKey,
}

pub fn keccak256(data: &[u8]) -> H256 {
    keccak_hash::keccak(data)
}

pub fn sha256(input: &[u8]) -> [u8; 32] {
    sha2::Sha256::digest(input).into()
}

/// RIPEMD-160 digest, left-padded to 32 bytes as the precompile returns it.
pub fn ripemd160_padded(input: &[u8]) -> [u8; 32] {
    let mut hasher = ripemd::Ripemd160::new();
    hasher.update(input);
    let digest = hasher.finalize();

    let mut output = [0u8; 32];
    output[12..].copy_from_slice(&digest);
    output
}

/// Recovers the signer address from a 64-byte compact signature and a raw
/// recovery id over a prehashed 32-byte message.
pub fn ecrecover(msg: &[u8; 32], recid: u8, sig: &[u8; 64]) -> Result<Address, CryptoError> {
    let recovery_id = secp256k1::ecdsa::RecoveryId::from_i32(recid as i32)
        .map_err(|_| CryptoError::InvalidRecoveryId)?;

    let recoverable_sig = secp256k1::ecdsa::RecoverableSignature::from_compact(sig, recovery_id)
        .map_err(|_| CryptoError::InvalidSignature)?;

    let message = secp256k1::Message::from_digest(*msg);

    let public_key = secp256k1::SECP256K1
        .recover_ecdsa(&message, &recoverable_sig)
        .map_err(|_| CryptoError::RecoveryFailed)?;

    let hash = keccak256(&public_key.serialize_uncompressed()[1..]);
    Ok(Address::from_slice(&hash[12..]))
}

/// Recovers the signer of `msg` from a 65-byte signature (r || s || recid,
/// recid in {0, 1}). The message is keccak-hashed before recovery.
pub fn recover_signer(msg: &[u8], sig: &[u8; 65]) -> Result<Address, CryptoError> {
    let digest = keccak256(msg);
    let compact: [u8; 64] = sig[..64]
        .try_into()
        .map_err(|_| CryptoError::InvalidSignature)?;
    ecrecover(&digest.0, sig[64], &compact)
}

/// Checks that `sig` is a signature over `msg` by the holder of `expected`.
pub fn verify_signature(msg: &[u8], sig: &[u8; 65], expected: Address) -> bool {
    matches!(recover_signer(msg, sig), Ok(signer) if signer == expected)
}

/// Signs keccak(msg) with a secp256k1 secret key, producing the 65-byte
/// recoverable form `recover_signer` accepts.
pub fn sign_message(msg: &[u8], secret: &[u8; 32]) -> Result<[u8; 65], CryptoError> {
    let secret_key =
        secp256k1::SecretKey::from_slice(secret).map_err(|_| CryptoError::InvalidKey)?;
    let digest = keccak256(msg);
    let message = secp256k1::Message::from_digest(digest.0);

    let signature = secp256k1::SECP256K1.sign_ecdsa_recoverable(&message, &secret_key);
    let (recovery_id, compact) = signature.serialize_compact();

    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&compact);
    out[64] = recovery_id.to_i32() as u8;
    Ok(out)
}

/// Address controlled by a secp256k1 secret key.
pub fn address_from_secret(secret: &[u8; 32]) -> Result<Address, CryptoError> {
    let secret_key =
        secp256k1::SecretKey::from_slice(secret).map_err(|_| CryptoError::InvalidKey)?;
    let public_key = secp256k1::PublicKey::from_secret_key(secp256k1::SECP256K1, &secret_key);
    let hash = keccak256(&public_key.serialize_uncompressed()[1..]);
    Ok(Address::from_slice(&hash[12..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            sha256(b"abc"),
            hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn ripemd160_is_left_padded() {
        let out = ripemd160_padded(b"abc");
        assert_eq!(out[..12], [0u8; 12]);
        assert_eq!(
            out[12..],
            hex!("8eb208f7e05d987a9b044a8e98c6b087f15a0bfc")
        );
    }

    #[test]
    fn keccak_of_empty_input() {
        assert_eq!(
            keccak256(&[]).0,
            hex!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
        );
    }

    #[test]
    fn sign_then_recover_round_trips() {
        let secret = [0x42u8; 32];
        let address = address_from_secret(&secret).unwrap();
        let sig = sign_message(b"ping", &secret).unwrap();
        assert_eq!(recover_signer(b"ping", &sig), Ok(address));
        assert!(verify_signature(b"ping", &sig, address));
        assert!(!verify_signature(b"pong", &sig, address));
    }

    #[test]
    fn ecrecover_rejects_bad_recovery_id() {
        let msg = [7u8; 32];
        let sig = [1u8; 64];
        assert_eq!(
            ecrecover(&msg, 9, &sig),
            Err(CryptoError::InvalidRecoveryId)
        );
    }
}
