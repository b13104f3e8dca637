use super::arithmetic::is_negative;
use crate::{
    call_frame::CallFrame,
    errors::{OpcodeResult, VMError},
    gas_cost,
    vm::Evm,
};
use ember_common::U256;

fn bool_word(condition: bool) -> U256 {
    if condition {
        U256::one()
    } else {
        U256::zero()
    }
}

impl Evm<'_> {
    pub(crate) fn op_lt(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let a = frame.stack.pop()?;
        let b = frame.stack.pop()?;
        frame.stack.push(bool_word(a < b))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_gt(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let a = frame.stack.pop()?;
        let b = frame.stack.pop()?;
        frame.stack.push(bool_word(a > b))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_slt(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let a = frame.stack.pop()?;
        let b = frame.stack.pop()?;
        let result = match (is_negative(a), is_negative(b)) {
            (true, false) => true,
            (false, true) => false,
            // Two's complement ordering matches unsigned ordering when
            // the signs agree.
            _ => a < b,
        };
        frame.stack.push(bool_word(result))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_sgt(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let a = frame.stack.pop()?;
        let b = frame.stack.pop()?;
        let result = match (is_negative(a), is_negative(b)) {
            (true, false) => false,
            (false, true) => true,
            _ => a > b,
        };
        frame.stack.push(bool_word(result))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_eq(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let a = frame.stack.pop()?;
        let b = frame.stack.pop()?;
        frame.stack.push(bool_word(a == b))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_iszero(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let a = frame.stack.pop()?;
        frame.stack.push(bool_word(a.is_zero()))?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_and(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let a = frame.stack.pop()?;
        let b = frame.stack.pop()?;
        frame.stack.push(a & b)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_or(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let a = frame.stack.pop()?;
        let b = frame.stack.pop()?;
        frame.stack.push(a | b)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_xor(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let a = frame.stack.pop()?;
        let b = frame.stack.pop()?;
        frame.stack.push(a ^ b)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_not(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let a = frame.stack.pop()?;
        frame.stack.push(!a)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_byte(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let index = frame.stack.pop()?;
        let value = frame.stack.pop()?;
        // Index 0 is the most significant byte.
        let result = if index >= U256::from(32) {
            U256::zero()
        } else {
            U256::from(value.byte(31 - index.as_usize()))
        };
        frame.stack.push(result)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_shl(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let shift = frame.stack.pop()?;
        let value = frame.stack.pop()?;
        let result = if shift >= U256::from(256) {
            U256::zero()
        } else {
            value << shift.as_usize()
        };
        frame.stack.push(result)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_shr(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let shift = frame.stack.pop()?;
        let value = frame.stack.pop()?;
        let result = if shift >= U256::from(256) {
            U256::zero()
        } else {
            value >> shift.as_usize()
        };
        frame.stack.push(result)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_sar(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let shift = frame.stack.pop()?;
        let value = frame.stack.pop()?;
        let negative = is_negative(value);
        let result = if shift >= U256::from(256) {
            if negative {
                U256::MAX
            } else {
                U256::zero()
            }
        } else {
            let shifted = value >> shift.as_usize();
            if negative {
                // Fill the vacated high bits with the sign.
                shifted | !(U256::MAX >> shift.as_usize())
            } else {
                shifted
            }
        };
        frame.stack.push(result)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }
}
