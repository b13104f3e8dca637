use crate::{
    call_frame::CallFrame,
    errors::{OpcodeResult, VMError},
    gas_cost,
    utils::{usize_from_word, word_from_h256},
    vm::Evm,
};
use ember_crypto::keccak256;

impl Evm<'_> {
    pub(crate) fn op_keccak256(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        let offset = usize_from_word(frame.stack.pop()?)?;
        let size = usize_from_word(frame.stack.pop()?)?;

        let hashing_cost = gas_cost::linear_cost(
            size,
            gas_cost::KECCAK256_BASE,
            gas_cost::KECCAK256_WORD,
        )?;
        let expansion_cost = frame.memory.expansion_cost(offset, size)?;
        frame.use_gas(
            hashing_cost
                .checked_add(expansion_cost)
                .ok_or(VMError::OutOfGas)?,
        )?;

        let data = frame.memory.load_range(offset, size)?;
        frame.stack.push(word_from_h256(keccak256(&data)))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }
}
