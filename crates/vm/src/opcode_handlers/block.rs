use crate::{
    call_frame::CallFrame,
    errors::{OpcodeResult, VMError},
    gas_cost,
    utils::word_from_address,
    vm::Evm,
};
use ember_common::U256;

impl Evm<'_> {
    /// Historical block hashes are not exposed; every query answers zero.
    pub(crate) fn op_blockhash(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BLOCKHASH_GAS)?;
        frame.stack.pop()?;
        frame.stack.push(U256::zero())?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_coinbase(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BASE)?;
        frame.stack.push(word_from_address(self.env.coinbase))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_timestamp(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BASE)?;
        frame.stack.push(U256::from(self.env.block_timestamp))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_number(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BASE)?;
        frame.stack.push(U256::from(self.env.block_height))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_difficulty(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BASE)?;
        frame.stack.push(self.env.difficulty)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_gaslimit(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::BASE)?;
        frame.stack.push(U256::from(self.env.block_gas_limit))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }
}
