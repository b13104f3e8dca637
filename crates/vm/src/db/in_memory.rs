//! Journaled in-memory state, used by the tests and by anything that wants
//! to run the engine against a transient world.

use crate::db::{Snapshot, StateStore};
use crate::errors::InternalError;
use bytes::Bytes;
use ember_common::{Address, EMPTY_CODE_HASH, H256, U256};
use ember_crypto::keccak256;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub balance: U256,
    pub stake_balance: U256,
    pub nonce: u64,
    pub code: Bytes,
    pub storage: BTreeMap<H256, H256>,
}

/// One undo record. Reverting pops these in reverse order and restores
/// the previous value each one captured.
#[derive(Debug, Clone)]
enum JournalEntry {
    Balance { address: Address, prev: U256 },
    StakeBalance { address: Address, prev: U256 },
    Nonce { address: Address, prev: u64 },
    Code { address: Address, prev: Bytes },
    Storage { address: Address, key: H256, prev: H256 },
    AccountReplaced { address: Address, prev: Option<Account> },
    Raw { key: Vec<u8>, prev: Option<Vec<u8>> },
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    accounts: FxHashMap<Address, Account>,
    raw: BTreeMap<Vec<u8>, Vec<u8>>,
    journal: Vec<JournalEntry>,
    block_height: u64,
}

impl InMemoryStore {
    pub fn new(block_height: u64) -> Self {
        InMemoryStore {
            block_height,
            ..Default::default()
        }
    }

    pub fn set_block_height(&mut self, height: u64) {
        self.block_height = height;
    }

    /// Seeds a gas-token balance without journaling, for genesis setup.
    pub fn seed_balance(&mut self, address: Address, balance: U256) {
        self.accounts.entry(address).or_default().balance = balance;
    }

    /// Seeds a stake-token balance without journaling, for genesis setup.
    pub fn seed_stake_balance(&mut self, address: Address, balance: U256) {
        self.accounts.entry(address).or_default().stake_balance = balance;
    }

    /// Sum of all gas-token balances, for conservation checks.
    pub fn total_balance(&self) -> U256 {
        self.accounts
            .values()
            .fold(U256::zero(), |acc, a| acc + a.balance)
    }

    /// Sum of all account-held stake-token balances. Stakes deposited
    /// into a pool are debited here and live in the pool records instead.
    pub fn total_stake_balance(&self) -> U256 {
        self.accounts
            .values()
            .fold(U256::zero(), |acc, a| acc + a.stake_balance)
    }

    /// Accesses an account for mutation, materializing an empty one (and
    /// journaling its creation) when the address is untouched.
    fn account_entry(&mut self, address: Address) -> &mut Account {
        if !self.accounts.contains_key(&address) {
            self.journal.push(JournalEntry::AccountReplaced {
                address,
                prev: None,
            });
            self.accounts.insert(address, Account::default());
        }
        // Just inserted above when absent.
        self.accounts.entry(address).or_default()
    }

    fn replace_account(&mut self, address: Address, account: Account) {
        let prev = self.accounts.insert(address, account);
        self.journal.push(JournalEntry::AccountReplaced { address, prev });
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Balance { address, prev } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.balance = prev;
                }
            }
            JournalEntry::StakeBalance { address, prev } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.stake_balance = prev;
                }
            }
            JournalEntry::Nonce { address, prev } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.nonce = prev;
                }
            }
            JournalEntry::Code { address, prev } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    account.code = prev;
                }
            }
            JournalEntry::Storage { address, key, prev } => {
                if let Some(account) = self.accounts.get_mut(&address) {
                    if prev.is_zero() {
                        account.storage.remove(&key);
                    } else {
                        account.storage.insert(key, prev);
                    }
                }
            }
            JournalEntry::AccountReplaced { address, prev } => match prev {
                Some(account) => {
                    self.accounts.insert(address, account);
                }
                None => {
                    self.accounts.remove(&address);
                }
            },
            JournalEntry::Raw { key, prev } => match prev {
                Some(value) => {
                    self.raw.insert(key, value);
                }
                None => {
                    self.raw.remove(&key);
                }
            },
        }
    }
}

impl StateStore for InMemoryStore {
    fn block_height(&self) -> u64 {
        self.block_height
    }

    fn exists(&self, address: Address) -> bool {
        self.accounts.contains_key(&address)
    }

    fn create_account(&mut self, address: Address) {
        self.replace_account(address, Account::default());
    }

    fn create_account_preserving_balance(&mut self, address: Address) {
        let (balance, stake_balance) = self
            .accounts
            .get(&address)
            .map(|a| (a.balance, a.stake_balance))
            .unwrap_or_default();
        self.replace_account(
            address,
            Account {
                balance,
                stake_balance,
                ..Default::default()
            },
        );
    }

    fn get_balance(&self, address: Address) -> U256 {
        self.accounts
            .get(&address)
            .map(|a| a.balance)
            .unwrap_or_default()
    }

    fn add_balance(&mut self, address: Address, amount: U256) -> Result<(), InternalError> {
        let account = self.account_entry(address);
        let new = account
            .balance
            .checked_add(amount)
            .ok_or(InternalError::BalanceOverflow)?;
        let prev = account.balance;
        account.balance = new;
        self.journal.push(JournalEntry::Balance { address, prev });
        Ok(())
    }

    fn sub_balance(&mut self, address: Address, amount: U256) -> Result<(), InternalError> {
        let account = self.account_entry(address);
        let new = account
            .balance
            .checked_sub(amount)
            .ok_or(InternalError::BalanceUnderflow)?;
        let prev = account.balance;
        account.balance = new;
        self.journal.push(JournalEntry::Balance { address, prev });
        Ok(())
    }

    fn get_stake_balance(&self, address: Address) -> U256 {
        self.accounts
            .get(&address)
            .map(|a| a.stake_balance)
            .unwrap_or_default()
    }

    fn add_stake_balance(&mut self, address: Address, amount: U256) -> Result<(), InternalError> {
        let account = self.account_entry(address);
        let new = account
            .stake_balance
            .checked_add(amount)
            .ok_or(InternalError::BalanceOverflow)?;
        let prev = account.stake_balance;
        account.stake_balance = new;
        self.journal
            .push(JournalEntry::StakeBalance { address, prev });
        Ok(())
    }

    fn sub_stake_balance(&mut self, address: Address, amount: U256) -> Result<(), InternalError> {
        let account = self.account_entry(address);
        let new = account
            .stake_balance
            .checked_sub(amount)
            .ok_or(InternalError::BalanceUnderflow)?;
        let prev = account.stake_balance;
        account.stake_balance = new;
        self.journal
            .push(JournalEntry::StakeBalance { address, prev });
        Ok(())
    }

    fn get_nonce(&self, address: Address) -> u64 {
        self.accounts
            .get(&address)
            .map(|a| a.nonce)
            .unwrap_or_default()
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) {
        let account = self.account_entry(address);
        let prev = account.nonce;
        account.nonce = nonce;
        self.journal.push(JournalEntry::Nonce { address, prev });
    }

    fn get_code(&self, address: Address) -> Bytes {
        self.accounts
            .get(&address)
            .map(|a| a.code.clone())
            .unwrap_or_default()
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        let account = self.account_entry(address);
        let prev = std::mem::replace(&mut account.code, code);
        self.journal.push(JournalEntry::Code { address, prev });
    }

    fn get_code_hash(&self, address: Address) -> H256 {
        match self.accounts.get(&address) {
            None => H256::zero(),
            Some(account) if account.code.is_empty() => EMPTY_CODE_HASH,
            Some(account) => keccak256(&account.code),
        }
    }

    fn get_storage(&self, address: Address, key: H256) -> H256 {
        self.accounts
            .get(&address)
            .and_then(|a| a.storage.get(&key).copied())
            .unwrap_or_default()
    }

    fn set_storage(&mut self, address: Address, key: H256, value: H256) {
        let account = self.account_entry(address);
        let prev = if value.is_zero() {
            account.storage.remove(&key).unwrap_or_default()
        } else {
            account.storage.insert(key, value).unwrap_or_default()
        };
        self.journal
            .push(JournalEntry::Storage { address, key, prev });
    }

    fn get_raw(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.raw.get(key).cloned()
    }

    fn set_raw(&mut self, key: &[u8], value: Vec<u8>) {
        let prev = self.raw.insert(key.to_vec(), value);
        self.journal.push(JournalEntry::Raw {
            key: key.to_vec(),
            prev,
        });
    }

    fn delete_raw(&mut self, key: &[u8]) {
        if let Some(prev) = self.raw.remove(key) {
            self.journal.push(JournalEntry::Raw {
                key: key.to_vec(),
                prev: Some(prev),
            });
        }
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.raw
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn snapshot(&self) -> Snapshot {
        self.journal.len()
    }

    fn revert_to_snapshot(&mut self, snapshot: Snapshot) {
        while self.journal.len() > snapshot {
            if let Some(entry) = self.journal.pop() {
                self.undo(entry);
            }
        }
    }
}
