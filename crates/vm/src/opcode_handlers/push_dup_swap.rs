use crate::{
    call_frame::CallFrame,
    errors::{OpcodeResult, VMError},
    gas_cost,
    utils::padded_slice,
    vm::Evm,
};
use ember_common::U256;

impl Evm<'_> {
    /// PUSH1..PUSH32. Immediate bytes past the end of code read as zero.
    pub(crate) fn op_push(
        &mut self,
        frame: &mut CallFrame,
        width: usize,
    ) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let bytes = padded_slice(&frame.code, frame.pc + 1, width);
        frame.stack.push(U256::from_big_endian(&bytes))?;
        Ok(OpcodeResult::Continue {
            pc_increment: width + 1,
        })
    }

    pub(crate) fn op_dup(
        &mut self,
        frame: &mut CallFrame,
        depth: usize,
    ) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        frame.stack.dup(depth)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_swap(
        &mut self,
        frame: &mut CallFrame,
        depth: usize,
    ) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        frame.stack.swap(depth)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }
}
