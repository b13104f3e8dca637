//! Top-level transaction execution: gas-limit validation, intrinsic gas,
//! and the dispatch into a call or a creation.

use crate::{
    db::StateStore,
    environment::Environment,
    errors::{ExecutionReport, TxResult, VMError},
    gas_cost,
    vm::{Evm, Log},
};
use bytes::Bytes;
use ember_common::{heights, Address, U256};
use tracing::debug;

/// A smart-contract transaction as the ledger hands it to the engine.
/// `to: None` is a contract creation.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub from: Address,
    pub to: Option<Address>,
    pub gas_limit: u64,
    pub gas_price: U256,
    /// Gas-token value sent along with the message.
    pub value: U256,
    /// Stake-token value sent along with the message. Ignored until the
    /// stake-transfer upgrade height.
    pub stake_value: U256,
    pub data: Bytes,
}

/// What the ledger records for one executed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub result: TxResult,
    pub gas_used: u64,
    pub output: Bytes,
    pub logs: Vec<Log>,
    /// Address of the deployed contract for a successful creation.
    pub contract_address: Option<Address>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.result, TxResult::Success)
    }

    fn fault(error: VMError, gas_used: u64) -> Self {
        ExecutionOutcome {
            result: TxResult::Revert(error),
            gas_used,
            output: Bytes::new(),
            logs: Vec::new(),
            contract_address: None,
        }
    }
}

/// Executes one transaction against `db` at its current block height.
///
/// The returned `Err` is reserved for internal invariant violations that
/// must abort block processing; every user-level failure comes back as an
/// `ExecutionOutcome` carrying the fault and the gas it consumed.
pub fn execute(
    db: &mut dyn StateStore,
    mut env: Environment,
    tx: &Transaction,
) -> Result<ExecutionOutcome, VMError> {
    let height = db.block_height();
    env.origin = tx.from;
    env.gas_price = tx.gas_price;
    env.block_height = height;

    if tx.gas_limit > heights::max_gas_limit(height) {
        return Ok(ExecutionOutcome::fault(VMError::InvalidGasLimit, 0));
    }

    // Failures before any code runs charge nothing; the ledger settles
    // fees only for executed transactions.
    let intrinsic = match gas_cost::intrinsic_gas(tx.to.is_none(), &tx.data) {
        Ok(intrinsic) => intrinsic,
        Err(error) => return Ok(ExecutionOutcome::fault(error, 0)),
    };
    let Some(remaining) = tx.gas_limit.checked_sub(intrinsic) else {
        return Ok(ExecutionOutcome::fault(VMError::OutOfGas, 0));
    };

    let mut evm = Evm::new(db, env);
    let _enter = evm.span.clone().entered();

    let (report, contract_address) = match tx.to {
        Some(to) => {
            let report = evm.call(
                tx.from,
                to,
                remaining,
                tx.value,
                tx.stake_value,
                tx.data.clone(),
            )?;
            (report, None)
        }
        None => {
            let (report, address) = evm.create(
                tx.from,
                remaining,
                tx.value,
                tx.stake_value,
                tx.data.clone(),
            )?;
            let created = report.is_success().then_some(address);
            (report, created)
        }
    };

    let outcome = seal_outcome(tx.gas_limit, report, evm.logs, contract_address);
    debug!(
        gas_used = outcome.gas_used,
        success = outcome.is_success(),
        "transaction executed"
    );
    Ok(outcome)
}

fn seal_outcome(
    gas_limit: u64,
    report: ExecutionReport,
    logs: Vec<Log>,
    contract_address: Option<Address>,
) -> ExecutionOutcome {
    let gas_used = gas_limit.saturating_sub(report.gas_left);
    let logs = if report.is_success() { logs } else { Vec::new() };
    ExecutionOutcome {
        result: report.result,
        gas_used,
        output: report.output,
        logs,
        contract_address,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn simple_transfer(value: u64) -> Transaction {
        Transaction {
            from: addr(1),
            to: Some(addr(2)),
            gas_limit: 100_000,
            gas_price: U256::one(),
            value: U256::from(value),
            stake_value: U256::zero(),
            data: Bytes::new(),
        }
    }

    #[test]
    fn gas_limit_above_block_maximum_is_rejected() {
        let mut db = InMemoryStore::new(1);
        let mut tx = simple_transfer(0);
        tx.gas_limit = heights::max_gas_limit(1) + 1;

        let outcome = execute(&mut db, Environment::new(addr(1), U256::one(), 1), &tx).unwrap();
        assert_eq!(outcome.result, TxResult::Revert(VMError::InvalidGasLimit));
        assert_eq!(outcome.gas_used, 0);
    }

    #[test]
    fn plain_transfer_uses_exactly_intrinsic_gas() {
        let mut db = InMemoryStore::new(1);
        db.seed_balance(addr(1), U256::from(1000));
        let tx = simple_transfer(40);

        let outcome = execute(&mut db, Environment::new(addr(1), U256::one(), 1), &tx).unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.gas_used, gas_cost::TX_GAS);
        assert_eq!(db.get_balance(addr(2)), U256::from(40));
        assert_eq!(db.get_balance(addr(1)), U256::from(960));
    }

    #[test]
    fn gas_limit_at_intrinsic_boundary() {
        let mut db = InMemoryStore::new(1);
        db.seed_balance(addr(1), U256::from(1000));

        let mut tx = simple_transfer(1);
        tx.gas_limit = gas_cost::TX_GAS;
        let outcome = execute(&mut db, Environment::new(addr(1), U256::one(), 1), &tx).unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.gas_used, gas_cost::TX_GAS);

        // One unit short of the intrinsic cost fails before execution, so
        // nothing is charged.
        let mut tx = simple_transfer(1);
        tx.gas_limit = gas_cost::TX_GAS - 1;
        let outcome = execute(&mut db, Environment::new(addr(1), U256::one(), 1), &tx).unwrap();
        assert_eq!(outcome.result, TxResult::Revert(VMError::OutOfGas));
        assert_eq!(outcome.gas_used, 0);
        // The failed attempt moved nothing; only the first transfer shows.
        assert_eq!(db.get_balance(addr(1)), U256::from(999));
    }

    #[test]
    fn transfer_to_fresh_address_without_value_is_a_ping() {
        let mut db = InMemoryStore::new(1);
        db.seed_balance(addr(1), U256::from(1000));
        let tx = simple_transfer(0);

        let outcome = execute(&mut db, Environment::new(addr(1), U256::one(), 1), &tx).unwrap();
        assert!(outcome.is_success());
        assert!(!db.exists(addr(2)));
    }

    #[test]
    fn insufficient_balance_fails_without_state_changes() {
        let mut db = InMemoryStore::new(1);
        db.seed_balance(addr(1), U256::from(10));
        let tx = simple_transfer(40);

        let outcome = execute(&mut db, Environment::new(addr(1), U256::one(), 1), &tx).unwrap();
        assert_eq!(
            outcome.result,
            TxResult::Revert(VMError::InsufficientBalance)
        );
        assert_eq!(db.get_balance(addr(1)), U256::from(10));
        assert!(!db.exists(addr(2)));
    }
}
