use crate::{
    call_frame::CallFrame,
    constants::CALL_STIPEND,
    errors::{OpcodeResult, VMError},
    gas_cost,
    utils::{address_from_word, h256_from_word, usize_from_word, word_from_address},
    vm::Evm,
};
use bytes::Bytes;
use ember_common::U256;

impl Evm<'_> {
    pub(crate) fn op_stop(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.output = Bytes::new();
        Ok(OpcodeResult::Halt)
    }

    pub(crate) fn op_return(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        let offset = usize_from_word(frame.stack.pop()?)?;
        let size = usize_from_word(frame.stack.pop()?)?;
        frame.use_gas(frame.memory.expansion_cost(offset, size)?)?;
        frame.output = Bytes::from(frame.memory.load_range(offset, size)?);
        Ok(OpcodeResult::Halt)
    }

    pub(crate) fn op_revert(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        let offset = usize_from_word(frame.stack.pop()?)?;
        let size = usize_from_word(frame.stack.pop()?)?;
        frame.use_gas(frame.memory.expansion_cost(offset, size)?)?;
        frame.output = Bytes::from(frame.memory.load_range(offset, size)?);
        Err(VMError::ExecutionReverted)
    }

    pub(crate) fn op_call(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        let gas_requested = frame.stack.pop()?;
        let to = address_from_word(frame.stack.pop()?);
        let value = frame.stack.pop()?;
        let (calldata, ret_offset, ret_size) = self.prepare_call_memory(frame)?;

        if self.is_static() && !value.is_zero() {
            return Err(VMError::WriteProtection);
        }

        let mut extra_cost = gas_cost::CALL_BASE_COST;
        if !value.is_zero() {
            extra_cost = extra_cost
                .checked_add(gas_cost::CALL_VALUE_COST)
                .ok_or(VMError::OutOfGas)?;
            if !self.db.exists(to) {
                extra_cost = extra_cost
                    .checked_add(gas_cost::CALL_NEW_ACCOUNT_COST)
                    .ok_or(VMError::OutOfGas)?;
            }
        }
        frame.use_gas(extra_cost)?;

        let mut gas_for_call = self.forwarded_gas(frame, gas_requested)?;
        if !value.is_zero() {
            gas_for_call = gas_for_call
                .checked_add(CALL_STIPEND)
                .ok_or(VMError::OutOfGas)?;
        }

        let sender = frame.to;
        let report = self.call(sender, to, gas_for_call, value, U256::zero(), calldata)?;
        self.apply_call_report(frame, report, ret_offset, ret_size)
    }

    pub(crate) fn op_callcode(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        let gas_requested = frame.stack.pop()?;
        let code_address = address_from_word(frame.stack.pop()?);
        let value = frame.stack.pop()?;
        let (calldata, ret_offset, ret_size) = self.prepare_call_memory(frame)?;

        let mut extra_cost = gas_cost::CALL_BASE_COST;
        if !value.is_zero() {
            extra_cost = extra_cost
                .checked_add(gas_cost::CALL_VALUE_COST)
                .ok_or(VMError::OutOfGas)?;
        }
        frame.use_gas(extra_cost)?;

        let mut gas_for_call = self.forwarded_gas(frame, gas_requested)?;
        if !value.is_zero() {
            gas_for_call = gas_for_call
                .checked_add(CALL_STIPEND)
                .ok_or(VMError::OutOfGas)?;
        }

        let context = frame.to;
        let report = self.call_code(context, context, code_address, gas_for_call, value, calldata)?;
        self.apply_call_report(frame, report, ret_offset, ret_size)
    }

    pub(crate) fn op_delegatecall(
        &mut self,
        frame: &mut CallFrame,
    ) -> Result<OpcodeResult, VMError> {
        let gas_requested = frame.stack.pop()?;
        let code_address = address_from_word(frame.stack.pop()?);
        let (calldata, ret_offset, ret_size) = self.prepare_call_memory(frame)?;

        frame.use_gas(gas_cost::CALL_BASE_COST)?;
        let gas_for_call = self.forwarded_gas(frame, gas_requested)?;

        let parent_sender = frame.msg_sender;
        let context = frame.to;
        let parent_value = frame.value;
        let report = self.delegate_call(
            parent_sender,
            context,
            code_address,
            gas_for_call,
            parent_value,
            calldata,
        )?;
        self.apply_call_report(frame, report, ret_offset, ret_size)
    }

    pub(crate) fn op_staticcall(
        &mut self,
        frame: &mut CallFrame,
    ) -> Result<OpcodeResult, VMError> {
        let gas_requested = frame.stack.pop()?;
        let to = address_from_word(frame.stack.pop()?);
        let (calldata, ret_offset, ret_size) = self.prepare_call_memory(frame)?;

        frame.use_gas(gas_cost::CALL_BASE_COST)?;
        let gas_for_call = self.forwarded_gas(frame, gas_requested)?;

        let sender = frame.to;
        let report = self.static_call(sender, to, gas_for_call, calldata)?;
        self.apply_call_report(frame, report, ret_offset, ret_size)
    }

    pub(crate) fn op_create(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        if self.is_static() {
            return Err(VMError::WriteProtection);
        }
        let value = frame.stack.pop()?;
        let offset = usize_from_word(frame.stack.pop()?)?;
        let size = usize_from_word(frame.stack.pop()?)?;

        let expansion_cost = frame.memory.expansion_cost(offset, size)?;
        frame.use_gas(
            gas_cost::CREATE_BASE_COST
                .checked_add(expansion_cost)
                .ok_or(VMError::OutOfGas)?,
        )?;
        let init_code = Bytes::from(frame.memory.load_range(offset, size)?);

        let gas_for_create = gas_cost::max_call_gas(frame.gas_left);
        frame.use_gas(gas_for_create)?;

        let sender = frame.to;
        let (report, address) =
            self.create(sender, gas_for_create, value, U256::zero(), init_code)?;
        self.apply_create_report(frame, report, address)
    }

    pub(crate) fn op_create2(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        if self.is_static() {
            return Err(VMError::WriteProtection);
        }
        let value = frame.stack.pop()?;
        let offset = usize_from_word(frame.stack.pop()?)?;
        let size = usize_from_word(frame.stack.pop()?)?;
        let salt = h256_from_word(frame.stack.pop()?);

        // The salted address derivation hashes the init code, so CREATE2
        // additionally pays the hashing cost per word.
        let hashing_cost = gas_cost::linear_cost(size, 0, gas_cost::KECCAK256_WORD)?;
        let expansion_cost = frame.memory.expansion_cost(offset, size)?;
        frame.use_gas(
            gas_cost::CREATE_BASE_COST
                .checked_add(hashing_cost)
                .and_then(|cost| cost.checked_add(expansion_cost))
                .ok_or(VMError::OutOfGas)?,
        )?;
        let init_code = Bytes::from(frame.memory.load_range(offset, size)?);

        let gas_for_create = gas_cost::max_call_gas(frame.gas_left);
        frame.use_gas(gas_for_create)?;

        let sender = frame.to;
        let (report, address) =
            self.create2(sender, gas_for_create, value, U256::zero(), init_code, salt)?;
        self.apply_create_report(frame, report, address)
    }

    /// Pops the argument and return ranges of a call, charges the memory
    /// expansion covering both, and reads the calldata.
    fn prepare_call_memory(
        &mut self,
        frame: &mut CallFrame,
    ) -> Result<(Bytes, usize, usize), VMError> {
        let args_offset = usize_from_word(frame.stack.pop()?)?;
        let args_size = usize_from_word(frame.stack.pop()?)?;
        let ret_offset = usize_from_word(frame.stack.pop()?)?;
        let ret_size = usize_from_word(frame.stack.pop()?)?;

        // Expansion cost grows with the furthest end, so the combined
        // charge is the larger of the two.
        let args_cost = frame.memory.expansion_cost(args_offset, args_size)?;
        let ret_cost = frame.memory.expansion_cost(ret_offset, ret_size)?;
        frame.use_gas(args_cost.max(ret_cost))?;
        frame.memory.grow(ret_offset, ret_size)?;

        let calldata = Bytes::from(frame.memory.load_range(args_offset, args_size)?);
        Ok((calldata, ret_offset, ret_size))
    }

    /// Caps the requested gas to all-but-one-64th of what remains and
    /// deducts it from the frame.
    fn forwarded_gas(&self, frame: &mut CallFrame, requested: U256) -> Result<u64, VMError> {
        let requested = if requested > U256::from(u64::MAX) {
            u64::MAX
        } else {
            requested.as_u64()
        };
        let gas_for_call = requested.min(gas_cost::max_call_gas(frame.gas_left));
        frame.use_gas(gas_for_call)?;
        Ok(gas_for_call)
    }

    fn apply_call_report(
        &mut self,
        frame: &mut CallFrame,
        report: crate::errors::ExecutionReport,
        ret_offset: usize,
        ret_size: usize,
    ) -> Result<OpcodeResult, VMError> {
        frame.returndata = report.output.clone();
        let copy_len = ret_size.min(report.output.len());
        if copy_len > 0 {
            frame
                .memory
                .store_data(ret_offset, copy_len, &report.output[..copy_len])?;
        }
        frame.refund_gas(report.gas_left)?;
        frame.stack.push(if report.is_success() {
            U256::one()
        } else {
            U256::zero()
        })?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    fn apply_create_report(
        &mut self,
        frame: &mut CallFrame,
        report: crate::errors::ExecutionReport,
        address: ember_common::Address,
    ) -> Result<OpcodeResult, VMError> {
        // Only a deliberate revert surfaces its output to the creator.
        frame.returndata = if report.error() == Some(&VMError::ExecutionReverted) {
            report.output.clone()
        } else {
            Bytes::new()
        };
        frame.refund_gas(report.gas_left)?;
        frame.stack.push(if report.is_success() {
            word_from_address(address)
        } else {
            U256::zero()
        })?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }
}
