//! Staking bridge: the pool records behind the staking precompiles and
//! the sortition used to weight elite-edge-node rewards.

pub mod pool;
pub mod sortition;

pub use pool::{
    finalize_stake_returns, stake_to_een, stake_to_guardian, total_staked_by,
    unstake_from_een, unstake_from_guardian, PoolKind, Stake, StakeHolder,
};
