//! Stake pool records.
//!
//! Two pools exist: guardians stake the stake token, elite edge nodes
//! stake the gas token. Holder records and the return queue live in the
//! raw key space of the state store as bincode blobs, so pool mutations
//! revert with the frame that made them.

use crate::{
    db::StateStore,
    errors::{InternalError, VMError},
};
use ember_common::{wei_per_token, Address, U256};
use ember_crypto::{bls, verify_signature};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Blocks between a withdrawal and the stake being paid back.
pub const RETURN_LOCKING_PERIOD: u64 = 28800;

/// Sentinel return height of a stake that has not been withdrawn.
pub const INVALID_RETURN_HEIGHT: u64 = u64::MAX;

/// Length of a staking summary: holder address, BLS public key, BLS proof
/// of possession, and the holder's secp256k1 signature over the proof.
pub const SUMMARY_LENGTH: usize = 20 + bls::PUBKEY_LENGTH + bls::SIGNATURE_LENGTH + 65;

pub fn guardian_min_stake() -> U256 {
    U256::from(1000) * wei_per_token()
}

pub fn een_min_stake() -> U256 {
    U256::from(10_000) * wei_per_token()
}

/// Cap for a single deposit and for a holder's aggregate stake.
pub fn een_max_stake() -> U256 {
    U256::from(500_000) * wei_per_token()
}

/// One source's stake held by one pool entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    pub source: Address,
    pub amount: U256,
    pub withdrawn: bool,
    pub return_height: u64,
}

/// A pool entry: the node's address and every stake delegated to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeHolder {
    pub holder: Address,
    pub stakes: Vec<Stake>,
}

impl StakeHolder {
    pub fn new(holder: Address) -> Self {
        StakeHolder {
            holder,
            stakes: Vec::new(),
        }
    }

    /// Adds to an existing stake from `source` or opens a new one. A
    /// source whose stake is pending return cannot top it up until the
    /// locking period ends.
    pub fn deposit(&mut self, source: Address, amount: U256) -> Result<(), VMError> {
        if let Some(stake) = self.stakes.iter_mut().find(|s| s.source == source) {
            if stake.withdrawn {
                return Err(VMError::InvalidStakeOperation);
            }
            stake.amount = stake
                .amount
                .checked_add(amount)
                .ok_or(InternalError::BalanceOverflow)?;
        } else {
            self.stakes.push(Stake {
                source,
                amount,
                withdrawn: false,
                return_height: INVALID_RETURN_HEIGHT,
            });
        }
        Ok(())
    }

    /// Marks the stake from `source` as withdrawn and schedules its
    /// return. Returns the height at which the funds come back.
    pub fn withdraw(&mut self, source: Address, current_height: u64) -> Result<u64, VMError> {
        let stake = self
            .stakes
            .iter_mut()
            .find(|s| s.source == source && !s.withdrawn)
            .ok_or(VMError::InvalidStakeOperation)?;
        let return_height = current_height
            .checked_add(RETURN_LOCKING_PERIOD)
            .ok_or(InternalError::ArithmeticOverflow)?;
        stake.withdrawn = true;
        stake.return_height = return_height;
        Ok(return_height)
    }

    /// Removes and returns the stake from `source` that is due exactly at
    /// `current_height`. The queue guarantees this is only called when
    /// such a stake exists; anything else is a corrupted record.
    pub fn return_stake(
        &mut self,
        source: Address,
        current_height: u64,
    ) -> Result<Stake, VMError> {
        let index = self
            .stakes
            .iter()
            .position(|s| s.source == source && s.withdrawn && s.return_height == current_height)
            .ok_or_else(|| {
                InternalError::StakeReturnMismatch(format!(
                    "no stake from {source:?} due at height {current_height}"
                ))
            })?;
        Ok(self.stakes.remove(index))
    }

    /// Sum of the stakes that have not been withdrawn.
    pub fn total_stake(&self) -> U256 {
        self.stakes
            .iter()
            .filter(|s| !s.withdrawn)
            .fold(U256::zero(), |acc, s| acc + s.amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Guardian,
    EliteEdgeNode,
}

impl PoolKind {
    fn holder_prefix(&self) -> &'static [u8] {
        match self {
            PoolKind::Guardian => b"staking/guardian/holder/",
            PoolKind::EliteEdgeNode => b"staking/een/holder/",
        }
    }

    fn queue_root(&self) -> &'static [u8] {
        match self {
            PoolKind::Guardian => b"staking/guardian/returns/",
            PoolKind::EliteEdgeNode => b"staking/een/returns/",
        }
    }

    fn holder_key(&self, holder: Address) -> Vec<u8> {
        let mut key = self.holder_prefix().to_vec();
        key.extend_from_slice(holder.as_bytes());
        key
    }

    /// Queue keys embed the big-endian height so a prefix scan walks the
    /// returns due at one height in deterministic order.
    fn queue_prefix(&self, height: u64) -> Vec<u8> {
        let mut key = self.queue_root().to_vec();
        key.extend_from_slice(&height.to_be_bytes());
        key
    }

    fn queue_key(&self, height: u64, holder: Address, source: Address) -> Vec<u8> {
        let mut key = self.queue_prefix(height);
        key.extend_from_slice(holder.as_bytes());
        key.extend_from_slice(source.as_bytes());
        key
    }
}

/// Entry in the per-height return queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StakeReturn {
    holder: Address,
    source: Address,
}

/// A parsed staking summary: who the node is and the proofs that bind its
/// BLS key to it.
pub(crate) struct BlsSummary {
    pub holder: Address,
    pub pubkey: bls::PublicKey,
    pub pop: bls::Signature,
    pub holder_sig: [u8; 65],
}

/// Accepts the exact summary length or the summary with one trailing
/// 32-byte word, which some callers include. The trailing bytes are
/// ignored.
pub(crate) fn parse_bls_summary(summary: &[u8]) -> Result<BlsSummary, VMError> {
    if summary.len() != SUMMARY_LENGTH && summary.len() != SUMMARY_LENGTH + 32 {
        return Err(VMError::InvalidStakeOperation);
    }
    let holder = Address::from_slice(&summary[..20]);
    let pubkey = bls::PublicKey::from_bytes(&summary[20..68])
        .map_err(|_| VMError::InvalidStakeOperation)?;
    let pop = bls::Signature::from_bytes(&summary[68..164])
        .map_err(|_| VMError::InvalidStakeOperation)?;
    let holder_sig: [u8; 65] = summary[164..229]
        .try_into()
        .map_err(|_| VMError::InvalidStakeOperation)?;
    Ok(BlsSummary {
        holder,
        pubkey,
        pop,
        holder_sig,
    })
}

/// Validates a summary for a holder joining a pool: the holder must have
/// signed the proof of possession, and the proof must verify against the
/// BLS public key.
fn check_bls_summary(summary: &BlsSummary) -> Result<(), VMError> {
    if summary.pop.is_identity() {
        return Err(VMError::InvalidStakeOperation);
    }
    if !verify_signature(&summary.pop.to_bytes(), &summary.holder_sig, summary.holder) {
        return Err(VMError::InvalidStakeOperation);
    }
    if !summary.pop.pop_verify(&summary.pubkey) {
        return Err(VMError::InvalidStakeOperation);
    }
    Ok(())
}

fn load_holder(
    db: &dyn StateStore,
    kind: PoolKind,
    holder: Address,
) -> Result<Option<StakeHolder>, VMError> {
    match db.get_raw(&kind.holder_key(holder)) {
        None => Ok(None),
        Some(bytes) => bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| InternalError::CorruptedPoolRecord(e.to_string()).into()),
    }
}

fn save_holder(
    db: &mut dyn StateStore,
    kind: PoolKind,
    record: &StakeHolder,
) -> Result<(), VMError> {
    let bytes = bincode::serialize(record)
        .map_err(|e| InternalError::CorruptedPoolRecord(e.to_string()))?;
    db.set_raw(&kind.holder_key(record.holder), bytes);
    Ok(())
}

/// Deposits `amount` of the stake token from `source` to the guardian
/// named in `summary`. The summary proofs are only checked when the
/// holder is new to the pool.
pub fn stake_to_guardian(
    db: &mut dyn StateStore,
    source: Address,
    summary: &[u8],
    amount: U256,
) -> Result<(), VMError> {
    let summary = parse_bls_summary(summary)?;
    if amount < guardian_min_stake() {
        return Err(VMError::InvalidStakeOperation);
    }
    if db.get_stake_balance(source) < amount {
        return Err(VMError::InsufficientStakeBalance);
    }

    let mut record = match load_holder(db, PoolKind::Guardian, summary.holder)? {
        Some(record) => record,
        None => {
            check_bls_summary(&summary)?;
            StakeHolder::new(summary.holder)
        }
    };
    record.deposit(source, amount)?;
    db.sub_stake_balance(source, amount)?;
    save_holder(db, PoolKind::Guardian, &record)?;

    debug!(holder = ?summary.holder, ?source, %amount, "guardian stake deposited");
    Ok(())
}

/// Withdraws `source`'s guardian stake from `holder`, scheduling its
/// return after the locking period.
pub fn unstake_from_guardian(
    db: &mut dyn StateStore,
    source: Address,
    holder: Address,
) -> Result<(), VMError> {
    unstake(db, PoolKind::Guardian, source, holder)
}

/// Deposits `amount` of the gas token from `source` to the elite edge
/// node named in `summary`. Both the single deposit and the holder's
/// aggregate are bounded.
pub fn stake_to_een(
    db: &mut dyn StateStore,
    source: Address,
    summary: &[u8],
    amount: U256,
) -> Result<(), VMError> {
    let summary = parse_bls_summary(summary)?;
    if amount < een_min_stake() || amount > een_max_stake() {
        return Err(VMError::InvalidStakeOperation);
    }
    if db.get_balance(source) < amount {
        return Err(VMError::InsufficientBalance);
    }

    let mut record = match load_holder(db, PoolKind::EliteEdgeNode, summary.holder)? {
        Some(record) => record,
        None => {
            check_bls_summary(&summary)?;
            StakeHolder::new(summary.holder)
        }
    };
    let aggregate = record
        .total_stake()
        .checked_add(amount)
        .ok_or(InternalError::BalanceOverflow)?;
    if aggregate > een_max_stake() {
        return Err(VMError::InvalidStakeOperation);
    }

    record.deposit(source, amount)?;
    db.sub_balance(source, amount)?;
    save_holder(db, PoolKind::EliteEdgeNode, &record)?;

    debug!(holder = ?summary.holder, ?source, %amount, "elite edge node stake deposited");
    Ok(())
}

pub fn unstake_from_een(
    db: &mut dyn StateStore,
    source: Address,
    holder: Address,
) -> Result<(), VMError> {
    unstake(db, PoolKind::EliteEdgeNode, source, holder)
}

fn unstake(
    db: &mut dyn StateStore,
    kind: PoolKind,
    source: Address,
    holder: Address,
) -> Result<(), VMError> {
    let mut record = load_holder(db, kind, holder)?.ok_or(VMError::InvalidStakeOperation)?;
    let return_height = record.withdraw(source, db.block_height())?;
    save_holder(db, kind, &record)?;

    let entry = bincode::serialize(&StakeReturn { holder, source })
        .map_err(|e| InternalError::CorruptedPoolRecord(e.to_string()))?;
    db.set_raw(&kind.queue_key(return_height, holder, source), entry);

    debug!(?holder, ?source, return_height, "stake withdrawal scheduled");
    Ok(())
}

/// Sum of `source`'s non-withdrawn guardian stakes across all holders.
pub fn total_staked_by(db: &dyn StateStore, source: Address) -> Result<U256, VMError> {
    let mut total = U256::zero();
    for (_, bytes) in db.scan_prefix(PoolKind::Guardian.holder_prefix()) {
        let record: StakeHolder = bincode::deserialize(&bytes)
            .map_err(|e| InternalError::CorruptedPoolRecord(e.to_string()))?;
        for stake in record.stakes.iter().filter(|s| !s.withdrawn) {
            if stake.source == source {
                total = total
                    .checked_add(stake.amount)
                    .ok_or(InternalError::BalanceOverflow)?;
            }
        }
    }
    Ok(total)
}

/// Pays back every stake whose locking period ends at `height`. Guardian
/// stakes return as the stake token, elite-edge-node stakes as the gas
/// token. Holders left with no stakes are removed from their pool.
pub fn finalize_stake_returns(db: &mut dyn StateStore, height: u64) -> Result<(), VMError> {
    for kind in [PoolKind::Guardian, PoolKind::EliteEdgeNode] {
        for (key, bytes) in db.scan_prefix(&kind.queue_prefix(height)) {
            let entry: StakeReturn = bincode::deserialize(&bytes)
                .map_err(|e| InternalError::CorruptedPoolRecord(e.to_string()))?;
            let mut record = load_holder(db, kind, entry.holder)?.ok_or_else(|| {
                InternalError::StakeReturnMismatch(format!(
                    "queued return for unknown holder {:?}",
                    entry.holder
                ))
            })?;

            let stake = record.return_stake(entry.source, height)?;
            match kind {
                PoolKind::Guardian => db.add_stake_balance(entry.source, stake.amount)?,
                PoolKind::EliteEdgeNode => db.add_balance(entry.source, stake.amount)?,
            }

            if record.stakes.is_empty() {
                db.delete_raw(&kind.holder_key(entry.holder));
            } else {
                save_holder(db, kind, &record)?;
            }
            db.delete_raw(&key);

            debug!(holder = ?entry.holder, source = ?entry.source, amount = %stake.amount, "stake returned");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use ember_crypto::{address_from_secret, sign_message};

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    /// Builds a fully valid summary whose holder address is derived from
    /// `secret` and whose BLS keys are derived from the same seed.
    fn valid_summary(secret: &[u8; 32]) -> (Address, Vec<u8>) {
        let holder = address_from_secret(secret).unwrap();
        let sk = bls::SecretKey::from_seed(secret);
        let pop = sk.sign_pop();
        let holder_sig = sign_message(&pop.to_bytes(), secret).unwrap();

        let mut summary = Vec::with_capacity(SUMMARY_LENGTH);
        summary.extend_from_slice(holder.as_bytes());
        summary.extend_from_slice(&sk.public_key().to_bytes());
        summary.extend_from_slice(&pop.to_bytes());
        summary.extend_from_slice(&holder_sig);
        (holder, summary)
    }

    #[test]
    fn stake_lifecycle_deposit_withdraw_return() {
        let mut db = InMemoryStore::new(100);
        let source = addr(0x11);
        let (holder, summary) = valid_summary(&[1u8; 32]);
        let amount = guardian_min_stake() * 2;
        db.seed_stake_balance(source, amount);

        stake_to_guardian(&mut db, source, &summary, amount).unwrap();
        assert_eq!(db.get_stake_balance(source), U256::zero());
        assert_eq!(total_staked_by(&db, source).unwrap(), amount);

        unstake_from_guardian(&mut db, source, holder).unwrap();
        assert_eq!(total_staked_by(&db, source).unwrap(), U256::zero());
        // Funds stay locked until the return height.
        assert_eq!(db.get_stake_balance(source), U256::zero());

        let return_height = 100 + RETURN_LOCKING_PERIOD;
        finalize_stake_returns(&mut db, return_height - 1).unwrap();
        assert_eq!(db.get_stake_balance(source), U256::zero());

        finalize_stake_returns(&mut db, return_height).unwrap();
        assert_eq!(db.get_stake_balance(source), amount);
        // Holder with no remaining stakes is gone from the pool.
        assert!(load_holder(&db, PoolKind::Guardian, holder).unwrap().is_none());
    }

    #[test]
    fn deposit_during_withdrawal_is_rejected() {
        let mut db = InMemoryStore::new(100);
        let source = addr(0x11);
        let (holder, summary) = valid_summary(&[2u8; 32]);
        db.seed_stake_balance(source, guardian_min_stake() * 10);

        stake_to_guardian(&mut db, source, &summary, guardian_min_stake()).unwrap();
        unstake_from_guardian(&mut db, source, holder).unwrap();
        assert_eq!(
            stake_to_guardian(&mut db, source, &summary, guardian_min_stake()),
            Err(VMError::InvalidStakeOperation)
        );
    }

    #[test]
    fn guardian_stake_below_minimum_is_rejected() {
        let mut db = InMemoryStore::new(100);
        let source = addr(0x11);
        let (_, summary) = valid_summary(&[3u8; 32]);
        db.seed_stake_balance(source, guardian_min_stake());

        assert_eq!(
            stake_to_guardian(&mut db, source, &summary, guardian_min_stake() - 1),
            Err(VMError::InvalidStakeOperation)
        );
    }

    #[test]
    fn tampered_summary_is_rejected_for_new_holder() {
        let mut db = InMemoryStore::new(100);
        let source = addr(0x11);
        let (_, mut summary) = valid_summary(&[4u8; 32]);
        db.seed_stake_balance(source, guardian_min_stake());

        // Flip a holder-signature byte.
        summary[200] ^= 0x01;
        assert_eq!(
            stake_to_guardian(&mut db, source, &summary, guardian_min_stake()),
            Err(VMError::InvalidStakeOperation)
        );
    }

    #[test]
    fn summary_is_not_rechecked_for_known_holder() {
        let mut db = InMemoryStore::new(100);
        let source = addr(0x11);
        let (_, summary) = valid_summary(&[5u8; 32]);
        db.seed_stake_balance(source, guardian_min_stake() * 4);

        stake_to_guardian(&mut db, source, &summary, guardian_min_stake()).unwrap();

        let mut tampered = summary.clone();
        tampered[200] ^= 0x01;
        stake_to_guardian(&mut db, source, &tampered, guardian_min_stake()).unwrap();
    }

    #[test]
    fn een_deposit_bounds_are_enforced() {
        let mut db = InMemoryStore::new(100);
        let source = addr(0x22);
        let (_, summary) = valid_summary(&[6u8; 32]);
        db.seed_balance(source, een_max_stake() * 3);

        assert_eq!(
            stake_to_een(&mut db, source, &summary, een_min_stake() - 1),
            Err(VMError::InvalidStakeOperation)
        );
        assert_eq!(
            stake_to_een(&mut db, source, &summary, een_max_stake() + 1),
            Err(VMError::InvalidStakeOperation)
        );
        stake_to_een(&mut db, source, &summary, een_max_stake()).unwrap();

        // The holder is at the aggregate cap, so another source is turned
        // away.
        let other = addr(0x33);
        db.seed_balance(other, een_min_stake());
        assert_eq!(
            stake_to_een(&mut db, other, &summary, een_min_stake()),
            Err(VMError::InvalidStakeOperation)
        );
    }

    #[test]
    fn een_stake_returns_as_gas_token() {
        let mut db = InMemoryStore::new(100);
        let source = addr(0x22);
        let (holder, summary) = valid_summary(&[7u8; 32]);
        db.seed_balance(source, een_min_stake());

        stake_to_een(&mut db, source, &summary, een_min_stake()).unwrap();
        assert_eq!(db.get_balance(source), U256::zero());

        unstake_from_een(&mut db, source, holder).unwrap();
        finalize_stake_returns(&mut db, 100 + RETURN_LOCKING_PERIOD).unwrap();
        assert_eq!(db.get_balance(source), een_min_stake());
        assert_eq!(db.get_stake_balance(source), U256::zero());
    }

    #[test]
    fn unstake_from_unknown_holder_fails() {
        let mut db = InMemoryStore::new(100);
        assert_eq!(
            unstake_from_guardian(&mut db, addr(1), addr(2)),
            Err(VMError::InvalidStakeOperation)
        );
    }

    #[test]
    fn summary_with_trailing_word_parses() {
        let (_, mut summary) = valid_summary(&[8u8; 32]);
        summary.extend_from_slice(&[0u8; 32]);
        assert!(parse_bls_summary(&summary).is_ok());
        summary.push(0);
        assert!(parse_bls_summary(&summary).is_err());
    }
}
