//! Protocol activation heights and the height-gated fee schedule.
//!
//! Every consensus rule change activates at a fixed block height so that
//! historical blocks replay under the rules they were produced with. Gates
//! are pure functions of the height, never mutable state.

use ethereum_types::U256;

/// Stake-token transfers inside contract execution, balance-preserving
/// account materialization, and the native stake transfer precompile.
pub const HEIGHT_STAKE_TRANSFER: u64 = 8_000_000;

/// Fee schedule adjustment: cheaper BN254 precompile pricing, a higher
/// transaction gas limit and a higher minimum gas price.
pub const HEIGHT_FEE_ADJUSTMENT: u64 = 9_200_000;

/// Guardian and elite-edge-node staking precompiles.
pub const HEIGHT_STAKING_PRECOMPILES: u64 = 9_600_000;

pub fn stake_transfer_enabled(height: u64) -> bool {
    height >= HEIGHT_STAKE_TRANSFER
}

pub fn fee_adjustment_enabled(height: u64) -> bool {
    height >= HEIGHT_FEE_ADJUSTMENT
}

pub fn staking_precompiles_enabled(height: u64) -> bool {
    height >= HEIGHT_STAKING_PRECOMPILES
}

/// Maximum gas limit a single transaction may declare.
pub fn max_gas_limit(height: u64) -> u64 {
    if fee_adjustment_enabled(height) {
        20_000_000
    } else {
        10_000_000
    }
}

/// Minimum gas price accepted for a transaction, in CNDR wei.
pub fn minimum_gas_price(height: u64) -> U256 {
    if fee_adjustment_enabled(height) {
        U256::from(4_000_000_000_000u64)
    } else {
        U256::from(100_000_000u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_schedule_switches_at_activation() {
        assert_eq!(max_gas_limit(HEIGHT_FEE_ADJUSTMENT - 1), 10_000_000);
        assert_eq!(max_gas_limit(HEIGHT_FEE_ADJUSTMENT), 20_000_000);
        assert_eq!(
            minimum_gas_price(HEIGHT_FEE_ADJUSTMENT - 1),
            U256::from(100_000_000u64)
        );
        assert_eq!(
            minimum_gas_price(HEIGHT_FEE_ADJUSTMENT),
            U256::from(4_000_000_000_000u64)
        );
    }

    #[test]
    fn gates_are_ordered() {
        assert!(HEIGHT_STAKE_TRANSFER < HEIGHT_FEE_ADJUSTMENT);
        assert!(HEIGHT_FEE_ADJUSTMENT < HEIGHT_STAKING_PRECOMPILES);
    }
}
