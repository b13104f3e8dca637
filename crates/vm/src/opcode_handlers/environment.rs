use crate::{
    call_frame::CallFrame,
    errors::{OpcodeResult, VMError},
    gas_cost,
    utils::{address_from_word, padded_slice, usize_from_word, word_from_address, word_from_h256},
    vm::Evm,
};
use ember_common::U256;

impl Evm<'_> {
    pub(crate) fn op_address(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BASE)?;
        frame.stack.push(word_from_address(frame.to))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_balance(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BALANCE_GAS)?;
        let address = address_from_word(frame.stack.pop()?);
        frame.stack.push(self.db.get_balance(address))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_origin(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BASE)?;
        frame.stack.push(word_from_address(self.env.origin))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_caller(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BASE)?;
        frame.stack.push(word_from_address(frame.msg_sender))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_callvalue(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BASE)?;
        frame.stack.push(frame.value)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_calldataload(
        &mut self,
        frame: &mut CallFrame,
    ) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let offset = frame.stack.pop()?;
        // An offset beyond any addressable range reads zeros.
        let word = match usize_from_word(offset) {
            Ok(offset) => {
                let bytes = padded_slice(&frame.calldata, offset, 32);
                U256::from_big_endian(&bytes)
            }
            Err(_) => U256::zero(),
        };
        frame.stack.push(word)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_calldatasize(
        &mut self,
        frame: &mut CallFrame,
    ) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BASE)?;
        frame.stack.push(U256::from(frame.calldata.len()))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_calldatacopy(
        &mut self,
        frame: &mut CallFrame,
    ) -> Result<OpcodeResult, VMError> {
        let dest_offset = usize_from_word(frame.stack.pop()?)?;
        let data_offset = frame.stack.pop()?;
        let size = usize_from_word(frame.stack.pop()?)?;
        self.charge_copy(frame, dest_offset, size, gas_cost::VERY_LOW)?;

        let data = match usize_from_word(data_offset) {
            Ok(offset) => padded_slice(&frame.calldata, offset, size),
            Err(_) => vec![0u8; size],
        };
        frame.memory.store_data(dest_offset, size, &data)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_codesize(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BASE)?;
        frame.stack.push(U256::from(frame.code.len()))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_codecopy(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        let dest_offset = usize_from_word(frame.stack.pop()?)?;
        let code_offset = frame.stack.pop()?;
        let size = usize_from_word(frame.stack.pop()?)?;
        self.charge_copy(frame, dest_offset, size, gas_cost::VERY_LOW)?;

        let data = match usize_from_word(code_offset) {
            Ok(offset) => padded_slice(&frame.code, offset, size),
            Err(_) => vec![0u8; size],
        };
        frame.memory.store_data(dest_offset, size, &data)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_gasprice(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BASE)?;
        frame.stack.push(self.env.gas_price)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_extcodesize(
        &mut self,
        frame: &mut CallFrame,
    ) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::EXTCODESIZE_GAS)?;
        let address = address_from_word(frame.stack.pop()?);
        frame.stack.push(U256::from(self.db.get_code(address).len()))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_extcodecopy(
        &mut self,
        frame: &mut CallFrame,
    ) -> Result<OpcodeResult, VMError> {
        let address = address_from_word(frame.stack.pop()?);
        let dest_offset = usize_from_word(frame.stack.pop()?)?;
        let code_offset = frame.stack.pop()?;
        let size = usize_from_word(frame.stack.pop()?)?;
        self.charge_copy(frame, dest_offset, size, gas_cost::EXTCODECOPY_BASE)?;

        let code = self.db.get_code(address);
        let data = match usize_from_word(code_offset) {
            Ok(offset) => padded_slice(&code, offset, size),
            Err(_) => vec![0u8; size],
        };
        frame.memory.store_data(dest_offset, size, &data)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_returndatasize(
        &mut self,
        frame: &mut CallFrame,
    ) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BASE)?;
        frame.stack.push(U256::from(frame.returndata.len()))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_returndatacopy(
        &mut self,
        frame: &mut CallFrame,
    ) -> Result<OpcodeResult, VMError> {
        let dest_offset = usize_from_word(frame.stack.pop()?)?;
        let data_offset = usize_from_word(frame.stack.pop()?)?;
        let size = usize_from_word(frame.stack.pop()?)?;
        self.charge_copy(frame, dest_offset, size, gas_cost::VERY_LOW)?;

        // Unlike the other copies, reading past the buffer is a fault.
        let end = data_offset
            .checked_add(size)
            .ok_or(VMError::ReturnDataOutOfBounds)?;
        if end > frame.returndata.len() {
            return Err(VMError::ReturnDataOutOfBounds);
        }
        let data = frame.returndata.slice(data_offset..end);
        frame.memory.store_data(dest_offset, size, &data)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_extcodehash(
        &mut self,
        frame: &mut CallFrame,
    ) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::EXTCODEHASH_GAS)?;
        let address = address_from_word(frame.stack.pop()?);
        frame
            .stack
            .push(word_from_h256(self.db.get_code_hash(address)))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    /// Shared cost of the copy opcodes: a base charge, 3 gas per copied
    /// word, and the destination's memory expansion.
    fn charge_copy(
        &mut self,
        frame: &mut CallFrame,
        dest_offset: usize,
        size: usize,
        base: u64,
    ) -> Result<(), VMError> {
        let copy_cost = gas_cost::linear_cost(size, base, gas_cost::COPY_WORD)?;
        let expansion_cost = frame.memory.expansion_cost(dest_offset, size)?;
        frame.use_gas(
            copy_cost
                .checked_add(expansion_cost)
                .ok_or(VMError::OutOfGas)?,
        )
    }
}
