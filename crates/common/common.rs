//! Shared primitive types and protocol constants for the Ember execution
//! engine.
//!
//! Every account on the chain carries two native balances: the stake token
//! (EMBR) and the gas token (CNDR). Both are denominated in wei (10^18 units
//! per token).

pub mod heights;

pub use ethereum_types::{Address, H160, H256, U256};

use hex_literal::hex;

/// Keccak-256 of the empty byte string. Accounts without code report this
/// as their code hash.
pub const EMPTY_CODE_HASH: H256 = H256(hex!(
    "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
));

/// One full token in wei.
pub fn wei_per_token() -> U256 {
    U256::exp10(18)
}

/// Builds a 20-byte address from the trailing bytes of `data`, zero padding
/// on the left. Inputs longer than 20 bytes keep only the last 20, matching
/// the wire behavior precompiles rely on.
pub fn address_from_bytes(data: &[u8]) -> Address {
    let mut out = [0u8; 20];
    if data.len() >= 20 {
        out.copy_from_slice(&data[data.len() - 20..]);
    } else {
        out[20 - data.len()..].copy_from_slice(data);
    }
    Address::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_from_short_and_long_inputs() {
        let addr = address_from_bytes(&[0xab]);
        assert_eq!(addr, Address::from_low_u64_be(0xab));

        let mut long = vec![0xff; 12];
        long.extend_from_slice(&[0u8; 19]);
        long.push(0x07);
        assert_eq!(address_from_bytes(&long), Address::from_low_u64_be(0x07));
    }
}
