//! State access boundary between the engine and whatever holds accounts.
//!
//! The engine never mutates state directly. Every write goes through this
//! trait so that a snapshot taken before a frame can be rolled back when
//! the frame fails. Implementations journal each mutation; a snapshot is
//! a position in that journal.

use crate::errors::InternalError;
use bytes::Bytes;
use ember_common::{Address, H256, U256};

pub mod in_memory;

pub use in_memory::InMemoryStore;

/// Opaque handle to a point in the mutation journal.
pub type Snapshot = usize;

pub trait StateStore {
    /// Height of the block whose transactions are being executed.
    fn block_height(&self) -> u64;

    fn exists(&self, address: Address) -> bool;

    /// Creates a fresh account at `address`, wiping anything there,
    /// including any gas-token balance it held.
    fn create_account(&mut self, address: Address);

    /// Creates a fresh account at `address` but carries over both token
    /// balances of whatever account previously occupied it.
    fn create_account_preserving_balance(&mut self, address: Address);

    fn get_balance(&self, address: Address) -> U256;
    fn add_balance(&mut self, address: Address, amount: U256) -> Result<(), InternalError>;
    fn sub_balance(&mut self, address: Address, amount: U256) -> Result<(), InternalError>;

    fn get_stake_balance(&self, address: Address) -> U256;
    fn add_stake_balance(&mut self, address: Address, amount: U256) -> Result<(), InternalError>;
    fn sub_stake_balance(&mut self, address: Address, amount: U256) -> Result<(), InternalError>;

    fn get_nonce(&self, address: Address) -> u64;
    fn set_nonce(&mut self, address: Address, nonce: u64);

    fn get_code(&self, address: Address) -> Bytes;
    fn set_code(&mut self, address: Address, code: Bytes);
    /// Zero for a non-existent account, the hash of the empty string for
    /// an existing account without code.
    fn get_code_hash(&self, address: Address) -> H256;

    fn get_storage(&self, address: Address, key: H256) -> H256;
    fn set_storage(&mut self, address: Address, key: H256, value: H256);

    // Raw key space used by the staking pools, outside any account.
    fn get_raw(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn set_raw(&mut self, key: &[u8], value: Vec<u8>);
    fn delete_raw(&mut self, key: &[u8]);
    /// All raw entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;

    fn snapshot(&self) -> Snapshot;
    fn revert_to_snapshot(&mut self, snapshot: Snapshot);
}
