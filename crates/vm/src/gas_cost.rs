//! Gas cost tables and formulas. All arithmetic is checked; a computation
//! that cannot fit in a u64 fails with `OutOfGas` instead of wrapping.

use crate::errors::{InternalError, VMError};
use ember_common::U256;

// Intrinsic gas
pub const TX_GAS: u64 = 21000;
pub const TX_GAS_CONTRACT_CREATION: u64 = 53000;
pub const TX_DATA_ZERO_GAS: u64 = 4;
pub const TX_DATA_NON_ZERO_GAS: u64 = 68;

// Opcode cost tiers
pub const BASE: u64 = 2;
pub const VERY_LOW: u64 = 3;
pub const LOW: u64 = 5;
pub const MID: u64 = 8;
pub const HIGH: u64 = 10;

pub const EXP_BYTE_GAS: u64 = 50;
pub const KECCAK256_BASE: u64 = 30;
pub const KECCAK256_WORD: u64 = 6;
pub const COPY_WORD: u64 = 3;
pub const BALANCE_GAS: u64 = 400;
pub const EXTCODESIZE_GAS: u64 = 700;
pub const EXTCODECOPY_BASE: u64 = 700;
pub const EXTCODEHASH_GAS: u64 = 400;
pub const BLOCKHASH_GAS: u64 = 20;
pub const SLOAD_GAS: u64 = 200;
pub const SSTORE_SET_GAS: u64 = 20000;
pub const SSTORE_RESET_GAS: u64 = 5000;
pub const JUMPDEST_GAS: u64 = 1;
pub const LOG_BASE: u64 = 375;
pub const LOG_TOPIC: u64 = 375;
pub const LOG_DATA_BYTE: u64 = 8;
pub const CREATE_BASE_COST: u64 = 32000;
pub const CALL_BASE_COST: u64 = 700;
pub const CALL_VALUE_COST: u64 = 9000;
pub const CALL_NEW_ACCOUNT_COST: u64 = 25000;

/// Per-byte cost of installing runtime code at the end of a creation.
pub const CODE_DEPOSIT_COST: u64 = 200;

// Precompile pricing. The BN254 trio is priced in two tiers selected by
// the fee-adjustment height.
pub const ECRECOVER_GAS: u64 = 3000;
pub const SHA256_BASE_GAS: u64 = 60;
pub const SHA256_WORD_GAS: u64 = 12;
pub const RIPEMD160_BASE_GAS: u64 = 600;
pub const RIPEMD160_WORD_GAS: u64 = 120;
pub const IDENTITY_BASE_GAS: u64 = 15;
pub const IDENTITY_WORD_GAS: u64 = 3;
pub const MODEXP_QUAD_COEFF_DIV: u64 = 20;
pub const BN256_ADD_GAS: u64 = 500;
pub const BN256_ADD_GAS_ADJUSTED: u64 = 150;
pub const BN256_SCALAR_MUL_GAS: u64 = 40000;
pub const BN256_SCALAR_MUL_GAS_ADJUSTED: u64 = 6000;
pub const BN256_PAIRING_BASE_GAS: u64 = 100000;
pub const BN256_PAIRING_BASE_GAS_ADJUSTED: u64 = 45000;
pub const BN256_PAIRING_POINT_GAS: u64 = 80000;
pub const BN256_PAIRING_POINT_GAS_ADJUSTED: u64 = 34000;

pub const STAKE_BALANCE_GAS: u64 = 400;
pub const TOTAL_STAKED_GAS: u64 = 5000;
pub const STAKE_TRANSFER_GAS: u64 = 9000;
pub const STAKE_DEPOSIT_GAS: u64 = 40000;
pub const STAKE_WITHDRAW_GAS: u64 = 25000;

/// Fixed plus per-byte cost charged before any code executes. Zero and
/// non-zero input bytes are priced differently.
pub fn intrinsic_gas(is_create: bool, data: &[u8]) -> Result<u64, VMError> {
    let mut gas = if is_create {
        TX_GAS_CONTRACT_CREATION
    } else {
        TX_GAS
    };

    if !data.is_empty() {
        let non_zero = data.iter().filter(|b| **b != 0).count() as u64;
        let zero = data.len() as u64 - non_zero;

        gas = non_zero
            .checked_mul(TX_DATA_NON_ZERO_GAS)
            .and_then(|cost| gas.checked_add(cost))
            .ok_or(VMError::OutOfGas)?;
        gas = zero
            .checked_mul(TX_DATA_ZERO_GAS)
            .and_then(|cost| gas.checked_add(cost))
            .ok_or(VMError::OutOfGas)?;
    }

    Ok(gas)
}

/// Number of 32-byte words needed to hold `len` bytes.
pub fn word_count(len: usize) -> u64 {
    (len as u64).div_ceil(32)
}

/// base + per_word * words, overflow-checked.
pub fn linear_cost(len: usize, base: u64, per_word: u64) -> Result<u64, VMError> {
    word_count(len)
        .checked_mul(per_word)
        .and_then(|cost| cost.checked_add(base))
        .ok_or(VMError::OutOfGas)
}

/// Total cost of a memory of `size` bytes: 3 per word plus a quadratic
/// term. `size` must already be word-aligned by the caller's expansion.
fn memory_total_cost(size: u64) -> Result<u64, VMError> {
    let words = size.div_ceil(32);
    let linear = words.checked_mul(VERY_LOW).ok_or(VMError::OutOfGas)?;
    let quadratic = words
        .checked_mul(words)
        .map(|sq| sq / 512)
        .ok_or(VMError::OutOfGas)?;
    linear.checked_add(quadratic).ok_or(VMError::OutOfGas)
}

/// Cost of growing memory from `current_size` to `new_size` bytes.
pub fn memory_expansion_cost(current_size: usize, new_size: usize) -> Result<u64, VMError> {
    if new_size <= current_size {
        return Ok(0);
    }
    let new_cost = memory_total_cost(new_size as u64)?;
    let current_cost = memory_total_cost(current_size as u64)?;
    new_cost
        .checked_sub(current_cost)
        .ok_or_else(|| InternalError::GasOverflow.into())
}

pub fn exp_cost(exponent: U256) -> Result<u64, VMError> {
    let byte_len = (exponent.bits() as u64).div_ceil(8);
    byte_len
        .checked_mul(EXP_BYTE_GAS)
        .and_then(|cost| cost.checked_add(HIGH))
        .ok_or(VMError::OutOfGas)
}

pub fn log_cost(topics: usize, data_len: usize) -> Result<u64, VMError> {
    let topic_cost = (topics as u64)
        .checked_mul(LOG_TOPIC)
        .ok_or(VMError::OutOfGas)?;
    let data_cost = (data_len as u64)
        .checked_mul(LOG_DATA_BYTE)
        .ok_or(VMError::OutOfGas)?;
    LOG_BASE
        .checked_add(topic_cost)
        .and_then(|cost| cost.checked_add(data_cost))
        .ok_or(VMError::OutOfGas)
}

/// The caller may forward at most all but one 64th of its remaining gas.
pub fn max_call_gas(gas_left: u64) -> u64 {
    gas_left - gas_left / 64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intrinsic_gas_prices_bytes_by_kind() {
        assert_eq!(intrinsic_gas(false, &[]), Ok(TX_GAS));
        assert_eq!(intrinsic_gas(true, &[]), Ok(TX_GAS_CONTRACT_CREATION));
        assert_eq!(
            intrinsic_gas(false, &[0x00, 0x01, 0x00]),
            Ok(TX_GAS + 2 * TX_DATA_ZERO_GAS + TX_DATA_NON_ZERO_GAS)
        );
    }

    #[test]
    fn memory_expansion_is_quadratic() {
        // 32 bytes: 3 gas. 1024 bytes: 32 words -> 96 + 2 = 98.
        assert_eq!(memory_expansion_cost(0, 32), Ok(3));
        assert_eq!(memory_expansion_cost(0, 1024), Ok(98));
        assert_eq!(memory_expansion_cost(1024, 1024), Ok(0));
        assert_eq!(memory_expansion_cost(1024, 32), Ok(0));
    }

    #[test]
    fn exp_cost_scales_with_exponent_width() {
        assert_eq!(exp_cost(U256::zero()), Ok(HIGH));
        assert_eq!(exp_cost(U256::from(0xff)), Ok(HIGH + EXP_BYTE_GAS));
        assert_eq!(exp_cost(U256::from(0x100)), Ok(HIGH + 2 * EXP_BYTE_GAS));
    }

    #[test]
    fn call_gas_keeps_one_64th() {
        assert_eq!(max_call_gas(6400), 6300);
        assert_eq!(max_call_gas(63), 63);
    }
}
