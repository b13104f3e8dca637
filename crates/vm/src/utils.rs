use crate::errors::VMError;
use ember_common::{Address, H256, U256};
use ember_crypto::keccak256;

/// Converts a stack word to a usize. Any value that does not fit cannot
/// name an affordable memory range, so it fails the frame as out of gas.
pub fn usize_from_word(value: U256) -> Result<usize, VMError> {
    if value > U256::from(usize::MAX) {
        return Err(VMError::OutOfGas);
    }
    Ok(value.as_usize())
}

pub fn word_from_address(address: Address) -> U256 {
    U256::from_big_endian(address.as_bytes())
}

pub fn address_from_word(word: U256) -> Address {
    let buf = word.to_big_endian();
    Address::from_slice(&buf[12..])
}

pub fn word_from_h256(hash: H256) -> U256 {
    U256::from_big_endian(hash.as_bytes())
}

pub fn h256_from_word(word: U256) -> H256 {
    H256(word.to_big_endian())
}

/// Reads `[offset, offset + size)` out of `data`, zero-padding past the
/// end. Shared by CALLDATALOAD, the copy opcodes and the precompiles.
pub fn padded_slice(data: &[u8], offset: usize, size: usize) -> Vec<u8> {
    let mut out = vec![0u8; size];
    if offset < data.len() {
        let available = data.len() - offset;
        let copy_len = size.min(available);
        out[..copy_len].copy_from_slice(&data[offset..offset + copy_len]);
    }
    out
}

// The create address only ever hashes a two-item list of a 20-byte string
// and a minimal integer, so this covers exactly the short-form encoding.
fn rlp_address_and_nonce(address: Address, nonce: u64) -> Vec<u8> {
    let nonce_bytes = {
        let be = nonce.to_be_bytes();
        let start = be.iter().position(|b| *b != 0).unwrap_or(8);
        be[start..].to_vec()
    };

    let mut payload = Vec::with_capacity(32);
    payload.push(0x80 + 20);
    payload.extend_from_slice(address.as_bytes());
    match nonce_bytes.as_slice() {
        [] => payload.push(0x80),
        [single] if *single < 0x80 => payload.push(*single),
        bytes => {
            payload.push(0x80 + bytes.len() as u8);
            payload.extend_from_slice(bytes);
        }
    }

    let mut encoded = Vec::with_capacity(payload.len() + 1);
    encoded.push(0xc0 + payload.len() as u8);
    encoded.extend_from_slice(&payload);
    encoded
}

/// Address of a contract created by CREATE or a creation transaction:
/// the low 20 bytes of keccak(rlp([sender, nonce])).
pub fn create_address(sender: Address, nonce: u64) -> Address {
    let hash = keccak256(&rlp_address_and_nonce(sender, nonce));
    Address::from_slice(&hash.as_bytes()[12..])
}

/// Address of a contract created by CREATE2: the low 20 bytes of
/// keccak(0xff || sender || salt || keccak(init_code)).
pub fn create2_address(sender: Address, salt: H256, init_code: &[u8]) -> Address {
    let code_hash = keccak256(init_code);
    let mut preimage = Vec::with_capacity(85);
    preimage.push(0xff);
    preimage.extend_from_slice(sender.as_bytes());
    preimage.extend_from_slice(salt.as_bytes());
    preimage.extend_from_slice(code_hash.as_bytes());
    let hash = keccak256(&preimage);
    Address::from_slice(&hash.as_bytes()[12..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn create_address_matches_known_vector() {
        // keccak(rlp([0x00..00, 0])) for the zero sender at nonce zero.
        let derived = create_address(Address::zero(), 0);
        let expected = Address::from_slice(&hex!("bd770416a3345f91e4b34576cb804a576fa48eb1"));
        assert_eq!(derived, expected);
    }

    #[test]
    fn create_address_changes_with_nonce() {
        let sender = Address::from_slice(&hex!("6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0"));
        assert_ne!(create_address(sender, 0), create_address(sender, 1));
        // Nonce 128 needs the long-form integer encoding.
        assert_ne!(create_address(sender, 127), create_address(sender, 128));
    }

    #[test]
    fn create2_address_matches_known_vector() {
        // EIP-1014 example 1: sender 0x00..00, salt 0x00..00, code 0x00.
        let derived = create2_address(Address::zero(), H256::zero(), &hex!("00"));
        let expected = Address::from_slice(&hex!("4d1a2e2bb4f88f0250f26ffff098b0b30b26bf38"));
        assert_eq!(derived, expected);
    }

    #[test]
    fn padded_slice_handles_out_of_range_reads() {
        let data = [1u8, 2, 3];
        assert_eq!(padded_slice(&data, 0, 3), vec![1, 2, 3]);
        assert_eq!(padded_slice(&data, 2, 3), vec![3, 0, 0]);
        assert_eq!(padded_slice(&data, 10, 2), vec![0, 0]);
    }

    #[test]
    fn address_word_round_trip() {
        let address = Address::from_slice(&hex!("00000000000000000000000000000000000000cb"));
        assert_eq!(address_from_word(word_from_address(address)), address);
    }
}
