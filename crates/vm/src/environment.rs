use ember_common::{Address, H256, U256};

/// Transaction-scoped context: fixed for the lifetime of one execution,
/// shared by every frame it spawns.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Externally owned account that signed the transaction.
    pub origin: Address,
    pub gas_price: U256,
    /// Height of the block the transaction executes in.
    pub block_height: u64,
    pub block_timestamp: u64,
    /// Hash of the block, used to seed the reward-weight draw.
    pub block_hash: H256,
    pub coinbase: Address,
    pub difficulty: U256,
    pub block_gas_limit: u64,
}

impl Environment {
    pub fn new(origin: Address, gas_price: U256, block_height: u64) -> Self {
        Environment {
            origin,
            gas_price,
            block_height,
            block_timestamp: 0,
            block_hash: H256::zero(),
            coinbase: Address::zero(),
            difficulty: U256::zero(),
            block_gas_limit: ember_common::heights::max_gas_limit(block_height),
        }
    }
}
