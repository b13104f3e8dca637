//! Precompiled contracts.
//!
//! Addresses 1 through 8 are the canonical cryptographic precompiles;
//! 201 through 207 are the staking bridge. The active set grows with the
//! chain height: stake transfers (203) arrive with the stake-transfer
//! upgrade, the pool operations (204-207) with the staking upgrade.

use crate::{
    errors::{ExecutionReport, VMError},
    gas_cost,
    staking,
    utils::padded_slice,
    vm::Evm,
};
use bytes::Bytes;
use ember_common::{address_from_bytes, heights, Address, U256};
use ember_crypto::{bn254, ecrecover, ripemd160_padded, sha256};
use num_bigint::BigUint;

const ECRECOVER: u64 = 1;
const SHA256: u64 = 2;
const RIPEMD160: u64 = 3;
const IDENTITY: u64 = 4;
const MODEXP: u64 = 5;
const BN256_ADD: u64 = 6;
const BN256_SCALAR_MUL: u64 = 7;
const BN256_PAIRING: u64 = 8;

const STAKE_BALANCE: u64 = 201;
const TOTAL_STAKED: u64 = 202;
const TRANSFER_STAKE: u64 = 203;
const STAKE_TO_GUARDIAN: u64 = 204;
const UNSTAKE_FROM_GUARDIAN: u64 = 205;
const STAKE_TO_EEN: u64 = 206;
const UNSTAKE_FROM_EEN: u64 = 207;

fn precompile_index(address: Address) -> Option<u64> {
    let index = address.to_low_u64_be();
    if Address::from_low_u64_be(index) == address {
        Some(index)
    } else {
        None
    }
}

pub fn is_precompile(address: Address, height: u64) -> bool {
    match precompile_index(address) {
        Some(ECRECOVER..=BN256_PAIRING | STAKE_BALANCE | TOTAL_STAKED) => true,
        Some(TRANSFER_STAKE) => heights::stake_transfer_enabled(height),
        Some(STAKE_TO_GUARDIAN..=UNSTAKE_FROM_EEN) => {
            heights::staking_precompiles_enabled(height)
        }
        _ => false,
    }
}

/// Runs the precompile at `address`. The full required gas is charged
/// up front; a body failure surfaces as a fault the caller settles by
/// reverting and burning.
pub fn execute(
    evm: &mut Evm,
    sender: Address,
    address: Address,
    input: &[u8],
    gas: u64,
) -> Result<ExecutionReport, VMError> {
    let Some(index) = precompile_index(address) else {
        return Ok(ExecutionReport::fault(VMError::InvalidOpcode, 0));
    };

    let required = match required_gas(index, input, evm.env.block_height) {
        Ok(required) => required,
        Err(error) => return Ok(ExecutionReport::fault(error, 0)),
    };
    let Some(gas_left) = gas.checked_sub(required) else {
        return Ok(ExecutionReport::fault(VMError::OutOfGas, 0));
    };

    match run_body(evm, sender, index, input) {
        Ok(output) => Ok(ExecutionReport::success(gas_left, output)),
        Err(error) if error.should_propagate() => Err(error),
        Err(error) => Ok(ExecutionReport::fault(error, 0)),
    }
}

fn required_gas(index: u64, input: &[u8], height: u64) -> Result<u64, VMError> {
    let adjusted = heights::fee_adjustment_enabled(height);
    let tier = |original, lowered| if adjusted { lowered } else { original };

    match index {
        ECRECOVER => Ok(gas_cost::ECRECOVER_GAS),
        SHA256 => gas_cost::linear_cost(
            input.len(),
            gas_cost::SHA256_BASE_GAS,
            gas_cost::SHA256_WORD_GAS,
        ),
        RIPEMD160 => gas_cost::linear_cost(
            input.len(),
            gas_cost::RIPEMD160_BASE_GAS,
            gas_cost::RIPEMD160_WORD_GAS,
        ),
        IDENTITY => gas_cost::linear_cost(
            input.len(),
            gas_cost::IDENTITY_BASE_GAS,
            gas_cost::IDENTITY_WORD_GAS,
        ),
        MODEXP => modexp_gas(input),
        BN256_ADD => Ok(tier(
            gas_cost::BN256_ADD_GAS,
            gas_cost::BN256_ADD_GAS_ADJUSTED,
        )),
        BN256_SCALAR_MUL => Ok(tier(
            gas_cost::BN256_SCALAR_MUL_GAS,
            gas_cost::BN256_SCALAR_MUL_GAS_ADJUSTED,
        )),
        BN256_PAIRING => {
            let points = (input.len() / 192) as u64;
            let base = tier(
                gas_cost::BN256_PAIRING_BASE_GAS,
                gas_cost::BN256_PAIRING_BASE_GAS_ADJUSTED,
            );
            let per_point = tier(
                gas_cost::BN256_PAIRING_POINT_GAS,
                gas_cost::BN256_PAIRING_POINT_GAS_ADJUSTED,
            );
            points
                .checked_mul(per_point)
                .and_then(|cost| cost.checked_add(base))
                .ok_or(VMError::OutOfGas)
        }
        STAKE_BALANCE => Ok(gas_cost::STAKE_BALANCE_GAS),
        TOTAL_STAKED => Ok(gas_cost::TOTAL_STAKED_GAS),
        TRANSFER_STAKE => Ok(gas_cost::STAKE_TRANSFER_GAS),
        STAKE_TO_GUARDIAN | STAKE_TO_EEN => Ok(gas_cost::STAKE_DEPOSIT_GAS),
        UNSTAKE_FROM_GUARDIAN | UNSTAKE_FROM_EEN => Ok(gas_cost::STAKE_WITHDRAW_GAS),
        _ => Err(VMError::InvalidOpcode),
    }
}

fn run_body(evm: &mut Evm, sender: Address, index: u64, input: &[u8]) -> Result<Bytes, VMError> {
    match index {
        ECRECOVER => Ok(run_ecrecover(input)),
        SHA256 => Ok(Bytes::copy_from_slice(&sha256(input))),
        RIPEMD160 => Ok(Bytes::copy_from_slice(&ripemd160_padded(input))),
        IDENTITY => Ok(Bytes::copy_from_slice(input)),
        MODEXP => run_modexp(input),
        BN256_ADD => {
            let padded = padded_slice(input, 0, 128);
            let sum = bn254::g1_add(&padded[..64], &padded[64..])?;
            Ok(Bytes::copy_from_slice(&sum))
        }
        BN256_SCALAR_MUL => {
            let padded = padded_slice(input, 0, 96);
            let product = bn254::g1_mul(&padded[..64], &padded[64..96])?;
            Ok(Bytes::copy_from_slice(&product))
        }
        BN256_PAIRING => run_bn256_pairing(input),
        STAKE_BALANCE => {
            let queried = address_from_bytes(input);
            Ok(word_output(evm.db.get_stake_balance(queried)))
        }
        TOTAL_STAKED => {
            let source = address_from_bytes(input);
            Ok(word_output(staking::total_staked_by(evm.db, source)?))
        }
        TRANSFER_STAKE => run_transfer_stake(evm, sender, input),
        STAKE_TO_GUARDIAN => {
            if input.len() < 261 {
                return Err(VMError::InvalidStakeOperation);
            }
            let amount = U256::from_big_endian(&input[229..261]);
            staking::stake_to_guardian(evm.db, sender, &input[..229], amount)?;
            Ok(Bytes::new())
        }
        UNSTAKE_FROM_GUARDIAN => {
            let holder = address_from_bytes(input);
            staking::unstake_from_guardian(evm.db, sender, holder)?;
            Ok(Bytes::new())
        }
        STAKE_TO_EEN => {
            // The deposit amount sits one word past the summary, leaving
            // a gap word that the summary parser ignores.
            if input.len() < 293 {
                return Err(VMError::InvalidStakeOperation);
            }
            let amount = U256::from_big_endian(&input[261..293]);
            staking::stake_to_een(evm.db, sender, &input[..261], amount)?;
            Ok(Bytes::new())
        }
        UNSTAKE_FROM_EEN => {
            let holder = address_from_bytes(input);
            staking::unstake_from_een(evm.db, sender, holder)?;
            Ok(Bytes::new())
        }
        _ => Err(VMError::InvalidOpcode),
    }
}

fn word_output(value: U256) -> Bytes {
    Bytes::copy_from_slice(&value.to_big_endian())
}

/// ecrecover returns an empty output rather than failing when the input
/// does not recover to a key.
fn run_ecrecover(input: &[u8]) -> Bytes {
    let padded = padded_slice(input, 0, 128);

    // v is a 32-byte word that must be exactly 27 or 28.
    if padded[32..63].iter().any(|b| *b != 0) {
        return Bytes::new();
    }
    let v = padded[63];
    if v != 27 && v != 28 {
        return Bytes::new();
    }

    let mut msg = [0u8; 32];
    msg.copy_from_slice(&padded[..32]);
    let mut sig = [0u8; 64];
    sig.copy_from_slice(&padded[64..128]);

    match ecrecover(&msg, v - 27, &sig) {
        Ok(address) => {
            let mut out = [0u8; 32];
            out[12..].copy_from_slice(address.as_bytes());
            Bytes::copy_from_slice(&out)
        }
        Err(_) => Bytes::new(),
    }
}

fn modexp_lengths(input: &[u8]) -> Result<(usize, usize, usize), VMError> {
    let header = padded_slice(input, 0, 96);
    let to_len = |bytes: &[u8]| -> Result<usize, VMError> {
        let value = U256::from_big_endian(bytes);
        if value > U256::from(usize::MAX) {
            return Err(VMError::OutOfGas);
        }
        Ok(value.as_usize())
    };
    Ok((
        to_len(&header[..32])?,
        to_len(&header[32..64])?,
        to_len(&header[64..96])?,
    ))
}

/// Gas for modular exponentiation: multiplication complexity of the wider
/// operand times the adjusted exponent length, divided by the quadratic
/// coefficient divisor.
fn modexp_gas(input: &[u8]) -> Result<u64, VMError> {
    let (base_len, exp_len, mod_len) = modexp_lengths(input)?;

    let exp_head_len = exp_len.min(32);
    let exp_head = padded_slice(
        input,
        96usize.checked_add(base_len).ok_or(VMError::OutOfGas)?,
        exp_head_len,
    );
    let head = BigUint::from_bytes_be(&exp_head);
    let head_bits = head.bits();

    let adjusted_exp_len = if exp_len <= 32 {
        head_bits.saturating_sub(1)
    } else {
        let tail = (exp_len as u64 - 32).saturating_mul(8);
        tail.saturating_add(head_bits.saturating_sub(1))
    };

    let width = base_len.max(mod_len) as u64;
    let complexity: u128 = if width <= 64 {
        u128::from(width) * u128::from(width)
    } else if width <= 1024 {
        u128::from(width) * u128::from(width) / 4 + 96 * u128::from(width) - 3072
    } else {
        u128::from(width) * u128::from(width) / 16 + 480 * u128::from(width) - 199_680
    };

    let gas = complexity
        .checked_mul(u128::from(adjusted_exp_len.max(1)))
        .ok_or(VMError::OutOfGas)?
        / u128::from(gas_cost::MODEXP_QUAD_COEFF_DIV);
    u64::try_from(gas).map_err(|_| VMError::OutOfGas)
}

fn run_modexp(input: &[u8]) -> Result<Bytes, VMError> {
    let (base_len, exp_len, mod_len) = modexp_lengths(input)?;
    if mod_len == 0 {
        return Ok(Bytes::new());
    }

    let base_start: usize = 96;
    let exp_start = base_start.checked_add(base_len).ok_or(VMError::OutOfGas)?;
    let mod_start = exp_start.checked_add(exp_len).ok_or(VMError::OutOfGas)?;

    let base = BigUint::from_bytes_be(&padded_slice(input, base_start, base_len));
    let exponent = BigUint::from_bytes_be(&padded_slice(input, exp_start, exp_len));
    let mod_bytes = padded_slice(input, mod_start, mod_len);
    let modulus = BigUint::from_bytes_be(&mod_bytes);

    // A zero modulus yields a zero-filled output of the modulus width.
    let mut out = vec![0u8; mod_len];
    if mod_bytes.iter().any(|b| *b != 0) {
        let result = base.modpow(&exponent, &modulus).to_bytes_be();
        let offset = mod_len - result.len();
        out[offset..].copy_from_slice(&result);
    }
    Ok(Bytes::from(out))
}

fn run_bn256_pairing(input: &[u8]) -> Result<Bytes, VMError> {
    if input.len() % 192 != 0 {
        return Err(ember_crypto::CryptoError::InvalidInput(
            "pairing input must be a multiple of 192 bytes",
        )
        .into());
    }
    let pairs: Vec<(&[u8], &[u8])> = input
        .chunks_exact(192)
        .map(|chunk| (&chunk[..64], &chunk[64..192]))
        .collect();
    let paired = bn254::pairing_check(&pairs)?;

    let mut out = [0u8; 32];
    if paired {
        out[31] = 1;
    }
    Ok(Bytes::copy_from_slice(&out))
}

/// Direct stake-token transfer: recipient in the first 20 bytes, amount
/// in the following 32.
fn run_transfer_stake(evm: &mut Evm, sender: Address, input: &[u8]) -> Result<Bytes, VMError> {
    if input.len() < 52 {
        return Err(VMError::InvalidStakeOperation);
    }
    let recipient = Address::from_slice(&input[..20]);
    let amount = U256::from_big_endian(&input[20..52]);

    if evm.db.get_stake_balance(sender) < amount {
        return Err(VMError::InsufficientStakeBalance);
    }
    evm.transfer_stake(sender, recipient, amount)?;
    Ok(Bytes::new())
}
