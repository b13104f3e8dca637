use crate::{
    call_frame::CallFrame,
    errors::{OpcodeResult, VMError},
    gas_cost,
    utils::{h256_from_word, usize_from_word},
    vm::{Evm, Log},
};
use bytes::Bytes;

impl Evm<'_> {
    pub(crate) fn op_log(
        &mut self,
        frame: &mut CallFrame,
        topic_count: usize,
    ) -> Result<OpcodeResult, VMError> {
        if self.is_static() {
            return Err(VMError::WriteProtection);
        }

        let offset = usize_from_word(frame.stack.pop()?)?;
        let size = usize_from_word(frame.stack.pop()?)?;
        let mut topics = Vec::with_capacity(topic_count);
        for _ in 0..topic_count {
            topics.push(h256_from_word(frame.stack.pop()?));
        }

        let log_cost = gas_cost::log_cost(topic_count, size)?;
        let expansion_cost = frame.memory.expansion_cost(offset, size)?;
        frame.use_gas(
            log_cost
                .checked_add(expansion_cost)
                .ok_or(VMError::OutOfGas)?,
        )?;

        let data = frame.memory.load_range(offset, size)?;
        self.logs.push(Log {
            address: frame.to,
            topics,
            data: Bytes::from(data),
        });
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }
}
