use crate::{
    call_frame::CallFrame,
    errors::{OpcodeResult, VMError},
    gas_cost,
    vm::Evm,
};
use ember_common::U256;
use ethereum_types::U512;

pub(crate) fn is_negative(value: U256) -> bool {
    value.bit(255)
}

/// Two's complement negation modulo 2^256.
pub(crate) fn negate(value: U256) -> U256 {
    (!value).overflowing_add(U256::one()).0
}

fn abs(value: U256) -> U256 {
    if is_negative(value) {
        negate(value)
    } else {
        value
    }
}

impl Evm<'_> {
    pub(crate) fn op_add(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let a = frame.stack.pop()?;
        let b = frame.stack.pop()?;
        frame.stack.push(a.overflowing_add(b).0)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_mul(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::LOW)?;
        let a = frame.stack.pop()?;
        let b = frame.stack.pop()?;
        frame.stack.push(a.overflowing_mul(b).0)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_sub(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::VERY_LOW)?;
        let a = frame.stack.pop()?;
        let b = frame.stack.pop()?;
        frame.stack.push(a.overflowing_sub(b).0)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_div(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::LOW)?;
        let a = frame.stack.pop()?;
        let b = frame.stack.pop()?;
        frame.stack.push(a.checked_div(b).unwrap_or_default())?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_sdiv(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::LOW)?;
        let a = frame.stack.pop()?;
        let b = frame.stack.pop()?;
        let result = if b.is_zero() {
            U256::zero()
        } else {
            let quotient = abs(a) / abs(b);
            if is_negative(a) != is_negative(b) {
                negate(quotient)
            } else {
                quotient
            }
        };
        frame.stack.push(result)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_mod(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::LOW)?;
        let a = frame.stack.pop()?;
        let b = frame.stack.pop()?;
        frame.stack.push(a.checked_rem(b).unwrap_or_default())?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_smod(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::LOW)?;
        let a = frame.stack.pop()?;
        let b = frame.stack.pop()?;
        // The remainder takes the sign of the dividend.
        let result = if b.is_zero() {
            U256::zero()
        } else {
            let remainder = abs(a) % abs(b);
            if is_negative(a) {
                negate(remainder)
            } else {
                remainder
            }
        };
        frame.stack.push(result)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_addmod(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::MID)?;
        let a = frame.stack.pop()?;
        let b = frame.stack.pop()?;
        let n = frame.stack.pop()?;
        let result = if n.is_zero() {
            U256::zero()
        } else {
            // The sum is computed at full width before the reduction.
            let sum = U512::from(a) + U512::from(b);
            let reduced = sum % U512::from(n);
            U256::try_from(reduced).unwrap_or_default()
        };
        frame.stack.push(result)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_mulmod(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::MID)?;
        let a = frame.stack.pop()?;
        let b = frame.stack.pop()?;
        let n = frame.stack.pop()?;
        let result = if n.is_zero() {
            U256::zero()
        } else {
            let product = a.full_mul(b);
            let reduced = product % U512::from(n);
            U256::try_from(reduced).unwrap_or_default()
        };
        frame.stack.push(result)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_exp(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        let base = frame.stack.pop()?;
        let exponent = frame.stack.pop()?;
        frame.use_gas(gas_cost::exp_cost(exponent)?)?;
        frame.stack.push(base.overflowing_pow(exponent).0)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }

    pub(crate) fn op_signextend(&mut self, frame: &mut CallFrame) -> Result<OpcodeResult, VMError> {
        frame.use_gas(gas_cost::LOW)?;
        let byte_index = frame.stack.pop()?;
        let value = frame.stack.pop()?;
        let result = if byte_index >= U256::from(31) {
            value
        } else {
            let sign_bit = byte_index.as_usize() * 8 + 7;
            let mask = (U256::one() << (sign_bit + 1)) - 1;
            if value.bit(sign_bit) {
                value | !mask
            } else {
                value & mask
            }
        };
        frame.stack.push(result)?;
        Ok(OpcodeResult::Continue { pc_increment: 1 })
    }
}
