use crate::{
    call_frame::CallFrame,
    errors::{OpcodeResult, VMError},
    gas_cost,
    utils::{h256_from_word, usize_from_word, word_from_h256},
    vm::Evm,
};
use ember_common::U256;

impl Evm<'_> {
    pub(crate) fn op_pop(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BASE)?;
        frame.stack.pop()?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_mload(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        let offset = usize_from_word(frame.stack.pop()?)?;
        let expansion_cost = frame.memory.expansion_cost(offset, 32)?;
        frame.use_gas(
            gas_cost::VERY_LOW
                .checked_add(expansion_cost)
                .ok_or(VMError::OutOfGas)?,
        )?;
        let word = frame.memory.load_word(offset)?;
        frame.stack.push(word)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_mstore(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        let offset = usize_from_word(frame.stack.pop()?)?;
        let value = frame.stack.pop()?;
        let expansion_cost = frame.memory.expansion_cost(offset, 32)?;
        frame.use_gas(
            gas_cost::VERY_LOW
                .checked_add(expansion_cost)
                .ok_or(VMError::OutOfGas)?,
        )?;
        frame.memory.store_word(offset, value)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_mstore8(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        let offset = usize_from_word(frame.stack.pop()?)?;
        let value = frame.stack.pop()?;
        let expansion_cost = frame.memory.expansion_cost(offset, 1)?;
        frame.use_gas(
            gas_cost::VERY_LOW
                .checked_add(expansion_cost)
                .ok_or(VMError::OutOfGas)?,
        )?;
        frame.memory.store_byte(offset, value.byte(0))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_sload(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::SLOAD_GAS)?;
        let key = h256_from_word(frame.stack.pop()?);
        let value = self.db.get_storage(frame.to, key);
        frame.stack.push(word_from_h256(value))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_sstore(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        if self.is_static() {
            return Err(VMError::WriteProtection);
        }
        let key = h256_from_word(frame.stack.pop()?);
        let value = h256_from_word(frame.stack.pop()?);

        // Writing a fresh slot costs the set price, overwriting costs the
        // reset price.
        let current = self.db.get_storage(frame.to, key);
        let cost = if current.is_zero() && !value.is_zero() {
            gas_cost::SSTORE_SET_GAS
        } else {
            gas_cost::SSTORE_RESET_GAS
        };
        frame.use_gas(cost)?;
        self.db.set_storage(frame.to, key, value);
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_jump(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::MID)?;
        let destination = usize_from_word(frame.stack.pop()?).map_err(|_| VMError::InvalidJump)?;
        if !frame.is_valid_jump(destination) {
            return Err(VMError::InvalidJump);
        }
        frame.pc = destination;
        Ok(OpcodeResult::Continue { pc_increment: 0 })
    }

    pub(crate) fn op_jumpi(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::HIGH)?;
        let destination = frame.stack.pop()?;
        let condition = frame.stack.pop()?;
        if condition.is_zero() {
            return Ok(OpcodeResult::Continue { pc_increment: 1 });
        }
        let destination = usize_from_word(destination).map_err(|_| VMError::InvalidJump)?;
        if !frame.is_valid_jump(destination) {
            return Err(VMError::InvalidJump);
        }
        frame.pc = destination;
        Ok(OpcodeResult::Continue { pc_increment: 0 })
    }

    pub(crate) fn op_pc(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BASE)?;
        frame.stack.push(U256::from(frame.pc))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_msize(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BASE)?;
        frame.stack.push(U256::from(frame.memory.len()))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_gas(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BASE)?;
        frame.stack.push(U256::from(frame.gas_left))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_jumpdest(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::JUMPDEST_GAS)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }
}
