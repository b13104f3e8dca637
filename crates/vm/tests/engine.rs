//! End-to-end engine tests: whole transactions executed against a
//! journaled in-memory state.

use bytes::Bytes;
use ember_common::{heights, wei_per_token, Address, H256, U256};
use ember_crypto::{address_from_secret, bls, sign_message};
use ember_vm::{
    execute, staking, Environment, Evm, InMemoryStore, StateStore, Transaction, TxResult, VMError,
};
use hex_literal::hex;

fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

fn env_at(height: u64) -> Environment {
    Environment::new(Address::zero(), U256::one(), height)
}

fn tx_to(from: Address, to: Address, data: Vec<u8>) -> Transaction {
    Transaction {
        from,
        to: Some(to),
        gas_limit: 1_000_000,
        gas_price: U256::one(),
        value: U256::zero(),
        stake_value: U256::zero(),
        data: Bytes::from(data),
    }
}

/// Init code that deploys a 10-byte runtime returning the single byte
/// 0x03.
const DEPLOY_CODE: [u8; 22] = hex!("600a600c600039600a6000f3600360135360016013f3");
const RUNTIME_CODE: [u8; 10] = hex!("600360135360016013f3");

#[test]
fn deploy_then_call_round_trip() {
    let mut db = InMemoryStore::new(1);
    let deployer = addr(0x01);
    db.seed_balance(deployer, U256::from(1_000_000));

    let deploy = Transaction {
        from: deployer,
        to: None,
        gas_limit: 1_000_000,
        gas_price: U256::one(),
        value: U256::zero(),
        stake_value: U256::zero(),
        data: Bytes::copy_from_slice(&DEPLOY_CODE),
    };
    let outcome = execute(&mut db, env_at(1), &deploy).unwrap();
    assert!(outcome.is_success(), "deploy failed: {:?}", outcome.result);

    let contract = outcome.contract_address.expect("created address");
    assert_eq!(db.get_code(contract)[..], RUNTIME_CODE[..]);
    assert_eq!(db.get_nonce(deployer), 1);

    let call = tx_to(deployer, contract, Vec::new());
    let outcome = execute(&mut db, env_at(1), &call).unwrap();
    assert!(outcome.is_success());
    assert_eq!(outcome.output[..], [0x03][..]);
}

#[test]
fn reverted_frame_leaves_no_state_and_refunds_gas() {
    let mut db = InMemoryStore::new(1);
    let caller = addr(0x01);
    let contract = addr(0xc0);
    db.seed_balance(caller, U256::from(1_000_000));
    // SSTORE(0, 1) then REVERT with empty output.
    db.create_account(contract);
    db.set_code(contract, Bytes::from_static(&hex!("600160005560006000fd")));

    let outcome = execute(&mut db, env_at(1), &tx_to(caller, contract, Vec::new())).unwrap();
    assert_eq!(
        outcome.result,
        TxResult::Revert(VMError::ExecutionReverted)
    );
    assert_eq!(db.get_storage(contract, H256::zero()), H256::zero());
    // REVERT returns the unused gas, so the burn is far below the limit.
    assert!(outcome.gas_used < 50_000);
    assert!(outcome.logs.is_empty());
}

#[test]
fn out_of_gas_burns_the_whole_limit() {
    let mut db = InMemoryStore::new(1);
    let caller = addr(0x01);
    let contract = addr(0xc0);
    db.seed_balance(caller, U256::from(1_000_000));
    // JUMPDEST; PUSH1 0; JUMP -- spins until gas runs out.
    db.create_account(contract);
    db.set_code(contract, Bytes::from_static(&hex!("5b600056")));

    let mut tx = tx_to(caller, contract, Vec::new());
    tx.gas_limit = 60_000;
    let outcome = execute(&mut db, env_at(1), &tx).unwrap();
    assert_eq!(outcome.result, TxResult::Revert(VMError::OutOfGas));
    assert_eq!(outcome.gas_used, 60_000);
}

#[test]
fn retired_selfdestruct_byte_is_an_invalid_opcode() {
    let mut db = InMemoryStore::new(1);
    let caller = addr(0x01);
    let contract = addr(0xc0);
    db.seed_balance(caller, U256::from(1_000_000));
    db.create_account(contract);
    db.set_code(contract, Bytes::from_static(&[0xff]));

    let mut tx = tx_to(caller, contract, Vec::new());
    tx.gas_limit = 40_000;
    let outcome = execute(&mut db, env_at(1), &tx).unwrap();
    assert_eq!(outcome.result, TxResult::Revert(VMError::InvalidOpcode));
    assert_eq!(outcome.gas_used, 40_000);
}

#[test]
fn both_token_totals_are_conserved_by_transfers() {
    let height = heights::HEIGHT_STAKE_TRANSFER;
    let mut db = InMemoryStore::new(height);
    let sender = addr(0x01);
    db.seed_balance(sender, U256::from(500));
    db.seed_stake_balance(sender, U256::from(300));
    let gas_total = db.total_balance();
    let stake_total = db.total_stake_balance();

    let mut tx = tx_to(sender, addr(0x02), Vec::new());
    tx.value = U256::from(120);
    tx.stake_value = U256::from(45);
    let outcome = execute(&mut db, env_at(height), &tx).unwrap();
    assert!(outcome.is_success());

    assert_eq!(db.get_balance(addr(0x02)), U256::from(120));
    assert_eq!(db.get_stake_balance(addr(0x02)), U256::from(45));
    assert_eq!(db.total_balance(), gas_total);
    assert_eq!(db.total_stake_balance(), stake_total);
}

#[test]
fn stake_only_message_to_fresh_address_is_a_ping() {
    // A message with no gas-token value short-circuits before any account
    // is created, even when it carries stake value.
    let height = heights::HEIGHT_STAKE_TRANSFER;
    let mut db = InMemoryStore::new(height);
    let sender = addr(0x01);
    db.seed_balance(sender, U256::from(500));
    db.seed_stake_balance(sender, U256::from(300));

    let mut tx = tx_to(sender, addr(0x02), Vec::new());
    tx.stake_value = U256::from(45);
    let outcome = execute(&mut db, env_at(height), &tx).unwrap();
    assert!(outcome.is_success());
    assert!(!db.exists(addr(0x02)));
    assert_eq!(db.get_stake_balance(sender), U256::from(300));
}

#[test]
fn creation_checks_and_transfers_the_stake_value() {
    let height = heights::HEIGHT_STAKE_TRANSFER;
    let mut db = InMemoryStore::new(height);
    let deployer = addr(0x01);
    db.seed_balance(deployer, U256::from(1_000_000));

    let deploy = Transaction {
        from: deployer,
        to: None,
        gas_limit: 1_000_000,
        gas_price: U256::one(),
        value: U256::zero(),
        stake_value: U256::from(50),
        data: Bytes::copy_from_slice(&DEPLOY_CODE),
    };

    // An unaffordable stake value fails the creation before the nonce
    // moves or any account is touched.
    let outcome = execute(&mut db, env_at(height), &deploy).unwrap();
    assert_eq!(
        outcome.result,
        TxResult::Revert(VMError::InsufficientStakeBalance)
    );
    assert_eq!(db.get_nonce(deployer), 0);

    // Funded, the stake value lands on the freshly deployed contract.
    db.seed_stake_balance(deployer, U256::from(80));
    let outcome = execute(&mut db, env_at(height), &deploy).unwrap();
    assert!(outcome.is_success(), "deploy failed: {:?}", outcome.result);
    let contract = outcome.contract_address.expect("created address");
    assert_eq!(db.get_stake_balance(contract), U256::from(50));
    assert_eq!(db.get_stake_balance(deployer), U256::from(30));
    assert_eq!(db.get_code(contract)[..], RUNTIME_CODE[..]);
}

#[test]
fn create2_collision_fails_and_burns_forwarded_gas() {
    let mut db = InMemoryStore::new(1);
    let sender = addr(0x01);
    db.seed_balance(sender, U256::from(1_000_000));

    let init = Bytes::copy_from_slice(&DEPLOY_CODE);
    let salt = H256::repeat_byte(0x5a);

    let mut evm = Evm::new(&mut db, env_at(1));
    let (report, first) = evm
        .create2(sender, 200_000, U256::zero(), U256::zero(), init.clone(), salt)
        .unwrap();
    assert!(report.is_success());
    assert_ne!(first, Address::zero());

    let (report, second) = evm
        .create2(sender, 200_000, U256::zero(), U256::zero(), init, salt)
        .unwrap();
    assert_eq!(
        report.result,
        TxResult::Revert(VMError::ContractAddressCollision)
    );
    assert_eq!(report.gas_left, 0);
    assert_eq!(second, Address::zero());
}

#[test]
fn stake_transfer_precompile_moves_stake_once_active() {
    let sender = addr(0x01);
    let recipient = addr(0x02);
    let transfer_stake = Address::from_low_u64_be(203);

    let mut input = recipient.as_bytes().to_vec();
    input.extend_from_slice(&U256::from(75).to_big_endian());

    // Before the upgrade the address is plain: no account, no value, so
    // the call is a ping and nothing moves.
    let before = heights::HEIGHT_STAKE_TRANSFER - 1;
    let mut db = InMemoryStore::new(before);
    db.seed_balance(sender, U256::from(1_000_000));
    db.seed_stake_balance(sender, U256::from(100));
    let outcome = execute(&mut db, env_at(before), &tx_to(sender, transfer_stake, input.clone()))
        .unwrap();
    assert!(outcome.is_success());
    assert_eq!(db.get_stake_balance(recipient), U256::zero());

    let after = heights::HEIGHT_STAKE_TRANSFER;
    let mut db = InMemoryStore::new(after);
    db.seed_balance(sender, U256::from(1_000_000));
    db.seed_stake_balance(sender, U256::from(100));
    let outcome =
        execute(&mut db, env_at(after), &tx_to(sender, transfer_stake, input.clone())).unwrap();
    assert!(outcome.is_success());
    assert_eq!(db.get_stake_balance(recipient), U256::from(75));
    assert_eq!(db.get_stake_balance(sender), U256::from(25));

    // Overdrawing fails the whole transaction and burns its gas.
    let outcome =
        execute(&mut db, env_at(after), &tx_to(sender, transfer_stake, input)).unwrap();
    assert_eq!(
        outcome.result,
        TxResult::Revert(VMError::InsufficientStakeBalance)
    );
    assert_eq!(outcome.gas_used, 1_000_000);
    assert_eq!(db.get_stake_balance(recipient), U256::from(75));
}

fn guardian_summary(secret: &[u8; 32]) -> (Address, Vec<u8>) {
    let holder = address_from_secret(secret).unwrap();
    let sk = bls::SecretKey::from_seed(secret);
    let pop = sk.sign_pop();
    let holder_sig = sign_message(&pop.to_bytes(), secret).unwrap();

    let mut summary = Vec::new();
    summary.extend_from_slice(holder.as_bytes());
    summary.extend_from_slice(&sk.public_key().to_bytes());
    summary.extend_from_slice(&pop.to_bytes());
    summary.extend_from_slice(&holder_sig);
    (holder, summary)
}

#[test]
fn guardian_staking_through_the_precompile_registry() {
    let height = heights::HEIGHT_STAKING_PRECOMPILES;
    let source = addr(0x01);
    let amount = U256::from(2000) * wei_per_token();
    let (holder, summary) = guardian_summary(&[9u8; 32]);

    let mut db = InMemoryStore::new(height);
    db.seed_balance(source, U256::from(10).pow(U256::from(18)));
    db.seed_stake_balance(source, amount);

    // Deposit through address 204: summary followed by the amount word.
    let mut input = summary;
    input.extend_from_slice(&amount.to_big_endian());
    let outcome = execute(
        &mut db,
        env_at(height),
        &tx_to(source, Address::from_low_u64_be(204), input),
    )
    .unwrap();
    assert!(outcome.is_success(), "deposit failed: {:?}", outcome.result);
    assert_eq!(db.get_stake_balance(source), U256::zero());

    // Address 202 reports the source's aggregate guardian stake.
    let outcome = execute(
        &mut db,
        env_at(height),
        &tx_to(source, Address::from_low_u64_be(202), source.as_bytes().to_vec()),
    )
    .unwrap();
    assert!(outcome.is_success());
    assert_eq!(U256::from_big_endian(&outcome.output), amount);

    // Address 201 reports the liquid stake balance, which is now zero.
    let outcome = execute(
        &mut db,
        env_at(height),
        &tx_to(source, Address::from_low_u64_be(201), source.as_bytes().to_vec()),
    )
    .unwrap();
    assert!(outcome.is_success());
    assert_eq!(U256::from_big_endian(&outcome.output), U256::zero());

    // Withdraw through address 205, then run the return queue at the
    // unlock height.
    let outcome = execute(
        &mut db,
        env_at(height),
        &tx_to(source, Address::from_low_u64_be(205), holder.as_bytes().to_vec()),
    )
    .unwrap();
    assert!(outcome.is_success(), "withdraw failed: {:?}", outcome.result);

    let unlock = height + staking::pool::RETURN_LOCKING_PERIOD;
    db.set_block_height(unlock);
    staking::finalize_stake_returns(&mut db, unlock).unwrap();
    assert_eq!(db.get_stake_balance(source), amount);
}

#[test]
fn failed_staking_deposit_reverts_the_pool_write() {
    // The deposit debits the source before the record is saved; if the
    // amount is below the guardian minimum nothing may persist.
    let height = heights::HEIGHT_STAKING_PRECOMPILES;
    let source = addr(0x01);
    let (_, summary) = guardian_summary(&[10u8; 32]);
    let amount = U256::from(10) * wei_per_token();

    let mut db = InMemoryStore::new(height);
    db.seed_balance(source, U256::from(10).pow(U256::from(18)));
    db.seed_stake_balance(source, amount);
    let stake_total = db.total_stake_balance();

    let mut input = summary;
    input.extend_from_slice(&amount.to_big_endian());
    let outcome = execute(
        &mut db,
        env_at(height),
        &tx_to(source, Address::from_low_u64_be(204), input),
    )
    .unwrap();
    assert_eq!(
        outcome.result,
        TxResult::Revert(VMError::InvalidStakeOperation)
    );
    assert_eq!(db.get_stake_balance(source), amount);
    assert_eq!(db.total_stake_balance(), stake_total);
}

#[test]
fn logs_survive_success_and_vanish_on_failure() {
    let mut db = InMemoryStore::new(1);
    let caller = addr(0x01);
    db.seed_balance(caller, U256::from(1_000_000));

    // LOG0 over empty memory, then STOP.
    let logger = addr(0xd0);
    db.create_account(logger);
    db.set_code(logger, Bytes::from_static(&hex!("60006000a000")));

    let outcome = execute(&mut db, env_at(1), &tx_to(caller, logger, Vec::new())).unwrap();
    assert!(outcome.is_success());
    assert_eq!(outcome.logs.len(), 1);
    assert_eq!(outcome.logs[0].address, logger);

    // LOG0 then REVERT: the log is discarded with the frame.
    let reverter = addr(0xd1);
    db.create_account(reverter);
    db.set_code(reverter, Bytes::from_static(&hex!("60006000a060006000fd")));

    let outcome = execute(&mut db, env_at(1), &tx_to(caller, reverter, Vec::new())).unwrap();
    assert_eq!(
        outcome.result,
        TxResult::Revert(VMError::ExecutionReverted)
    );
    assert!(outcome.logs.is_empty());
}

#[test]
fn nested_call_failure_is_contained_by_the_caller() {
    let mut db = InMemoryStore::new(1);
    let caller = addr(0x01);
    db.seed_balance(caller, U256::from(1_000_000));

    // Callee: always reverts.
    let callee = addr(0xce);
    db.create_account(callee);
    db.set_code(callee, Bytes::from_static(&hex!("60006000fd")));

    // Caller contract: CALL the callee with no value, store the success
    // flag at slot 0, then STOP. CALL args are all zero except the
    // address and a fixed gas word.
    //
    //   PUSH1 0 PUSH1 0 PUSH1 0 PUSH1 0 PUSH1 0
    //   PUSH20 <callee> PUSH2 0xffff CALL
    //   PUSH1 0 SSTORE STOP
    let mut code = vec![
        0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x73,
    ];
    code.extend_from_slice(callee.as_bytes());
    code.extend_from_slice(&[0x61, 0xff, 0xff, 0xf1, 0x60, 0x00, 0x55, 0x00]);

    let outer = addr(0xca);
    db.create_account(outer);
    db.set_code(outer, Bytes::from(code));

    let outcome = execute(&mut db, env_at(1), &tx_to(caller, outer, Vec::new())).unwrap();
    assert!(outcome.is_success(), "outer call failed: {:?}", outcome.result);
    // The callee reverted, so the stored success flag is zero.
    assert_eq!(db.get_storage(outer, H256::zero()), H256::zero());
}
