use crate::{
    call_frame::CallFrame,
    constants::{MAX_CALL_DEPTH, MAX_CODE_SIZE},
    db::{Snapshot, StateStore},
    environment::Environment,
    errors::{ExecutionReport, InternalError, OpcodeResult, TxResult, VMError},
    gas_cost,
    opcodes, precompiles,
    utils::{create2_address, create_address},
};
use bytes::Bytes;
use ember_common::{heights, Address, H256, U256};
use tracing::debug;

/// Event emitted by a LOG opcode. Logs are collected per transaction and
/// discarded for any frame that fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
}

/// The execution engine. One instance runs one transaction; nested calls
/// recurse through the same instance.
pub struct Evm<'a> {
    pub db: &'a mut dyn StateStore,
    pub env: Environment,
    pub logs: Vec<Log>,
    /// Current call depth. Incremented for each frame being run.
    pub(crate) depth: usize,
    /// Nesting level of STATICCALL frames. Writes are rejected while > 0.
    pub(crate) static_depth: usize,
    pub(crate) span: tracing::Span,
}

impl<'a> Evm<'a> {
    pub fn new(db: &'a mut dyn StateStore, env: Environment) -> Self {
        let span = tracing::info_span!("evm", height = env.block_height);
        Evm {
            db,
            env,
            logs: Vec::new(),
            depth: 0,
            static_depth: 0,
            span,
        }
    }

    pub(crate) fn is_static(&self) -> bool {
        self.static_depth > 0
    }

    /// Moves gas-token balance. A zero amount is a no-op so that it never
    /// materializes accounts on its own.
    pub(crate) fn transfer(
        &mut self,
        from: Address,
        to: Address,
        value: U256,
    ) -> Result<(), VMError> {
        if value.is_zero() {
            return Ok(());
        }
        self.db.sub_balance(from, value)?;
        self.db.add_balance(to, value)?;
        Ok(())
    }

    pub(crate) fn transfer_stake(
        &mut self,
        from: Address,
        to: Address,
        value: U256,
    ) -> Result<(), VMError> {
        if value.is_zero() {
            return Ok(());
        }
        self.db.sub_stake_balance(from, value)?;
        self.db.add_stake_balance(to, value)?;
        Ok(())
    }

    /// Message call against `to`. This is the entry point for both the
    /// top-level transaction and the CALL opcode (which passes a zero
    /// `stake_value`).
    ///
    /// Depth and balance failures return with the gas untouched. Failures
    /// inside the callee revert its state changes and burn its remaining
    /// gas, except for an explicit REVERT which keeps both its output and
    /// its unused gas.
    pub fn call(
        &mut self,
        sender: Address,
        to: Address,
        gas: u64,
        value: U256,
        stake_value: U256,
        calldata: Bytes,
    ) -> Result<ExecutionReport, VMError> {
        let height = self.env.block_height;
        let stake_transfers = heights::stake_transfer_enabled(height);

        if self.depth > MAX_CALL_DEPTH {
            return Ok(ExecutionReport::fault(VMError::CallDepthExceeded, gas));
        }
        if self.db.get_balance(sender) < value {
            return Ok(ExecutionReport::fault(VMError::InsufficientBalance, gas));
        }
        if stake_transfers && self.db.get_stake_balance(sender) < stake_value {
            return Ok(ExecutionReport::fault(
                VMError::InsufficientStakeBalance,
                gas,
            ));
        }

        let snapshot = self.db.snapshot();
        let logs_checkpoint = self.logs.len();
        let precompile = precompiles::is_precompile(to, height);

        if !self.db.exists(to) {
            // Calling a fresh address with no value moves nothing and
            // leaves no account behind. A stake-only transfer to a fresh
            // address takes this path too and transfers nothing.
            if !precompile && value.is_zero() {
                return Ok(ExecutionReport::success(gas, Bytes::new()));
            }
            if stake_transfers {
                self.db.create_account_preserving_balance(to);
            } else {
                self.db.create_account(to);
            }
        }

        self.transfer(sender, to, value)?;
        if stake_transfers {
            self.transfer_stake(sender, to, stake_value)?;
        }

        if precompile {
            let report = precompiles::execute(self, sender, to, &calldata, gas)?;
            return self.settle(report, snapshot, logs_checkpoint);
        }

        let code = self.db.get_code(to);
        if code.is_empty() {
            return Ok(ExecutionReport::success(gas, Bytes::new()));
        }

        let mut frame = CallFrame::new(sender, to, code, calldata, value, gas);
        let report = self.run(&mut frame)?;
        self.settle(report, snapshot, logs_checkpoint)
    }

    /// CALLCODE: runs the code at `code_address` against the caller's own
    /// storage and balance.
    pub fn call_code(
        &mut self,
        sender: Address,
        context: Address,
        code_address: Address,
        gas: u64,
        value: U256,
        calldata: Bytes,
    ) -> Result<ExecutionReport, VMError> {
        if self.depth > MAX_CALL_DEPTH {
            return Ok(ExecutionReport::fault(VMError::CallDepthExceeded, gas));
        }
        if self.db.get_balance(sender) < value {
            return Ok(ExecutionReport::fault(VMError::InsufficientBalance, gas));
        }
        self.run_against_context(sender, context, code_address, gas, value, calldata)
    }

    /// DELEGATECALL: runs foreign code in the caller's context, keeping
    /// the parent frame's sender and value. No balance check is made
    /// because no value moves.
    pub fn delegate_call(
        &mut self,
        parent_sender: Address,
        context: Address,
        code_address: Address,
        gas: u64,
        parent_value: U256,
        calldata: Bytes,
    ) -> Result<ExecutionReport, VMError> {
        if self.depth > MAX_CALL_DEPTH {
            return Ok(ExecutionReport::fault(VMError::CallDepthExceeded, gas));
        }
        self.run_against_context(
            parent_sender,
            context,
            code_address,
            gas,
            parent_value,
            calldata,
        )
    }

    /// STATICCALL: a value-less call with all state writes rejected for
    /// its whole subtree.
    pub fn static_call(
        &mut self,
        sender: Address,
        to: Address,
        gas: u64,
        calldata: Bytes,
    ) -> Result<ExecutionReport, VMError> {
        self.static_depth += 1;
        let result = self.call(sender, to, gas, U256::zero(), U256::zero(), calldata);
        self.static_depth -= 1;
        result
    }

    fn run_against_context(
        &mut self,
        sender: Address,
        context: Address,
        code_address: Address,
        gas: u64,
        value: U256,
        calldata: Bytes,
    ) -> Result<ExecutionReport, VMError> {
        let snapshot = self.db.snapshot();
        let logs_checkpoint = self.logs.len();

        if precompiles::is_precompile(code_address, self.env.block_height) {
            let report = precompiles::execute(self, sender, code_address, &calldata, gas)?;
            return self.settle(report, snapshot, logs_checkpoint);
        }

        let code = self.db.get_code(code_address);
        if code.is_empty() {
            return Ok(ExecutionReport::success(gas, Bytes::new()));
        }

        let mut frame = CallFrame::new(sender, context, code, calldata, value, gas);
        let report = self.run(&mut frame)?;
        self.settle(report, snapshot, logs_checkpoint)
    }

    /// Contract creation with the nonce-derived address.
    pub fn create(
        &mut self,
        sender: Address,
        gas: u64,
        value: U256,
        stake_value: U256,
        init_code: Bytes,
    ) -> Result<(ExecutionReport, Address), VMError> {
        let address = create_address(sender, self.db.get_nonce(sender));
        self.create_inner(sender, gas, value, stake_value, init_code, address)
    }

    /// Contract creation with the salt-derived address.
    pub fn create2(
        &mut self,
        sender: Address,
        gas: u64,
        value: U256,
        stake_value: U256,
        init_code: Bytes,
        salt: H256,
    ) -> Result<(ExecutionReport, Address), VMError> {
        let address = create2_address(sender, salt, &init_code);
        self.create_inner(sender, gas, value, stake_value, init_code, address)
    }

    fn create_inner(
        &mut self,
        sender: Address,
        gas: u64,
        value: U256,
        stake_value: U256,
        init_code: Bytes,
        address: Address,
    ) -> Result<(ExecutionReport, Address), VMError> {
        let stake_transfers = heights::stake_transfer_enabled(self.env.block_height);

        if self.depth > MAX_CALL_DEPTH {
            return Ok((
                ExecutionReport::fault(VMError::CallDepthExceeded, gas),
                Address::zero(),
            ));
        }
        if self.db.get_balance(sender) < value {
            return Ok((
                ExecutionReport::fault(VMError::InsufficientBalance, gas),
                Address::zero(),
            ));
        }
        if stake_transfers && self.db.get_stake_balance(sender) < stake_value {
            return Ok((
                ExecutionReport::fault(VMError::InsufficientStakeBalance, gas),
                Address::zero(),
            ));
        }

        // The sender's nonce moves even when the creation then collides.
        let nonce = self.db.get_nonce(sender);
        let next = nonce.checked_add(1).ok_or(InternalError::NonceOverflow)?;
        self.db.set_nonce(sender, next);

        let code_hash = self.db.get_code_hash(address);
        let occupied = self.db.get_nonce(address) != 0
            || (!code_hash.is_zero() && code_hash != ember_common::EMPTY_CODE_HASH);
        if occupied {
            return Ok((
                ExecutionReport::fault(VMError::ContractAddressCollision, 0),
                Address::zero(),
            ));
        }

        let snapshot = self.db.snapshot();
        let logs_checkpoint = self.logs.len();

        if stake_transfers {
            self.db.create_account_preserving_balance(address);
        } else {
            self.db.create_account(address);
        }
        self.transfer(sender, address, value)?;
        if stake_transfers {
            self.transfer_stake(sender, address, stake_value)?;
        }

        let mut frame = CallFrame::new(sender, address, init_code, Bytes::new(), value, gas);
        let mut report = self.run(&mut frame)?;

        if report.is_success() {
            report = self.deposit_code(address, report)?;
        }

        let report = self.settle(report, snapshot, logs_checkpoint)?;
        let created = if report.is_success() {
            address
        } else {
            Address::zero()
        };
        Ok((report, created))
    }

    /// Installs the constructor's output as the account's runtime code,
    /// charging the per-byte deposit cost.
    fn deposit_code(
        &mut self,
        address: Address,
        mut report: ExecutionReport,
    ) -> Result<ExecutionReport, VMError> {
        let code = report.output.clone();
        if code.len() > MAX_CODE_SIZE {
            report.result = TxResult::Revert(VMError::MaxCodeSizeExceeded);
            return Ok(report);
        }
        let deposit_cost = (code.len() as u64)
            .checked_mul(gas_cost::CODE_DEPOSIT_COST)
            .ok_or(InternalError::GasOverflow)?;
        match report.gas_left.checked_sub(deposit_cost) {
            Some(gas_left) => {
                report.gas_left = gas_left;
                self.db.set_code(address, code);
            }
            None => {
                report.result = TxResult::Revert(VMError::CodeStoreOutOfGas);
            }
        }
        Ok(report)
    }

    /// Applies the failure policy to a finished frame: roll the state and
    /// logs back, and burn the remaining gas unless the frame reverted
    /// deliberately.
    fn settle(
        &mut self,
        mut report: ExecutionReport,
        snapshot: Snapshot,
        logs_checkpoint: usize,
    ) -> Result<ExecutionReport, VMError> {
        if let Some(error) = report.error() {
            debug!(%error, depth = self.depth, "frame failed");
            self.db.revert_to_snapshot(snapshot);
            self.logs.truncate(logs_checkpoint);
            if *error != VMError::ExecutionReverted {
                report.gas_left = 0;
                report.output = Bytes::new();
            }
        }
        Ok(report)
    }

    /// Runs one frame to completion. Internal faults propagate as `Err`;
    /// everything else is folded into the report for the caller to settle.
    pub(crate) fn run(&mut self, frame: &mut CallFrame) -> Result<ExecutionReport, VMError> {
        self.depth += 1;
        let outcome = self.execution_loop(frame);
        self.depth -= 1;

        match outcome {
            Ok(()) => Ok(ExecutionReport::success(
                frame.gas_left,
                frame.output.clone(),
            )),
            Err(error) if error.should_propagate() => Err(error),
            Err(VMError::ExecutionReverted) => Ok(ExecutionReport {
                result: TxResult::Revert(VMError::ExecutionReverted),
                gas_left: frame.gas_left,
                output: frame.output.clone(),
            }),
            Err(error) => Ok(ExecutionReport {
                result: TxResult::Revert(error),
                gas_left: frame.gas_left,
                output: Bytes::new(),
            }),
        }
    }

    fn execution_loop(&mut self, frame: &mut CallFrame) -> Result<(), VMError> {
        loop {
            let opcode = frame.current_opcode();
            match self.step(opcode, frame)? {
                OpcodeResult::Continue { pc_increment } => {
                    frame.pc = frame
                        .pc
                        .checked_add(pc_increment)
                        .ok_or(InternalError::ArithmeticOverflow)?;
                }
                OpcodeResult::Halt => return Ok(()),
            }
        }
    }

    fn step(&mut self, opcode: u8, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        match opcode {
            opcodes::STOP => self.op_stop(frame),
            opcodes::ADD => self.op_add(frame),
            opcodes::MUL => self.op_mul(frame),
            opcodes::SUB => self.op_sub(frame),
            opcodes::DIV => self.op_div(frame),
            opcodes::SDIV => self.op_sdiv(frame),
            opcodes::MOD => self.op_mod(frame),
            opcodes::SMOD => self.op_smod(frame),
            opcodes::ADDMOD => self.op_addmod(frame),
            opcodes::MULMOD => self.op_mulmod(frame),
            opcodes::EXP => self.op_exp(frame),
            opcodes::SIGNEXTEND => self.op_signextend(frame),

            opcodes::LT => self.op_lt(frame),
            opcodes::GT => self.op_gt(frame),
            opcodes::SLT => self.op_slt(frame),
            opcodes::SGT => self.op_sgt(frame),
            opcodes::EQ => self.op_eq(frame),
            opcodes::ISZERO => self.op_iszero(frame),
            opcodes::AND => self.op_and(frame),
            opcodes::OR => self.op_or(frame),
            opcodes::XOR => self.op_xor(frame),
            opcodes::NOT => self.op_not(frame),
            opcodes::BYTE => self.op_byte(frame),
            opcodes::SHL => self.op_shl(frame),
            opcodes::SHR => self.op_shr(frame),
            opcodes::SAR => self.op_sar(frame),

            opcodes::KECCAK256 => self.op_keccak256(frame),

            opcodes::ADDRESS => self.op_address(frame),
            opcodes::BALANCE => self.op_balance(frame),
            opcodes::ORIGIN => self.op_origin(frame),
            opcodes::CALLER => self.op_caller(frame),
            opcodes::CALLVALUE => self.op_callvalue(frame),
            opcodes::CALLDATALOAD => self.op_calldataload(frame),
            opcodes::CALLDATASIZE => self.op_calldatasize(frame),
            opcodes::CALLDATACOPY => self.op_calldatacopy(frame),
            opcodes::CODESIZE => self.op_codesize(frame),
            opcodes::CODECOPY => self.op_codecopy(frame),
            opcodes::GASPRICE => self.op_gasprice(frame),
            opcodes::EXTCODESIZE => self.op_extcodesize(frame),
            opcodes::EXTCODECOPY => self.op_extcodecopy(frame),
            opcodes::RETURNDATASIZE => self.op_returndatasize(frame),
            opcodes::RETURNDATACOPY => self.op_returndatacopy(frame),
            opcodes::EXTCODEHASH => self.op_extcodehash(frame),

            opcodes::BLOCKHASH => self.op_blockhash(frame),
            opcodes::COINBASE => self.op_coinbase(frame),
            opcodes::TIMESTAMP => self.op_timestamp(frame),
            opcodes::NUMBER => self.op_number(frame),
            opcodes::DIFFICULTY => self.op_difficulty(frame),
            opcodes::GASLIMIT => self.op_gaslimit(frame),

            opcodes::POP => self.op_pop(frame),
            opcodes::MLOAD => self.op_mload(frame),
            opcodes::MSTORE => self.op_mstore(frame),
            opcodes::MSTORE8 => self.op_mstore8(frame),
            opcodes::SLOAD => self.op_sload(frame),
            opcodes::SSTORE => self.op_sstore(frame),
            opcodes::JUMP => self.op_jump(frame),
            opcodes::JUMPI => self.op_jumpi(frame),
            opcodes::PC => self.op_pc(frame),
            opcodes::MSIZE => self.op_msize(frame),
            opcodes::GAS => self.op_gas(frame),
            opcodes::JUMPDEST => self.op_jumpdest(frame),

            op if (opcodes::PUSH1..=opcodes::PUSH32).contains(&op) => {
                self.op_push(frame, (op - opcodes::PUSH1) as usize + 1)
            }
            op if (opcodes::DUP1..=opcodes::DUP16).contains(&op) => {
                self.op_dup(frame, (op - opcodes::DUP1) as usize + 1)
            }
            op if (opcodes::SWAP1..=opcodes::SWAP16).contains(&op) => {
                self.op_swap(frame, (op - opcodes::SWAP1) as usize + 1)
            }
            op if (opcodes::LOG0..=opcodes::LOG4).contains(&op) => {
                self.op_log(frame, (op - opcodes::LOG0) as usize)
            }

            opcodes::CREATE => self.op_create(frame),
            opcodes::CALL => self.op_call(frame),
            opcodes::CALLCODE => self.op_callcode(frame),
            opcodes::RETURN => self.op_return(frame),
            opcodes::DELEGATECALL => self.op_delegatecall(frame),
            opcodes::CREATE2 => self.op_create2(frame),
            opcodes::STATICCALL => self.op_staticcall(frame),
            opcodes::REVERT => self.op_revert(frame),

            // INVALID, the retired self-destruct byte, and every
            // unassigned byte consume the frame's remaining gas.
            _ => Err(VMError::InvalidOpcode),
        }
    }
}
