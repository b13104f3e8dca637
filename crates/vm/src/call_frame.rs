use crate::{
    constants::STACK_LIMIT,
    errors::{InternalError, VMError},
    memory::Memory,
};
use bytes::Bytes;
use ember_common::{Address, U256};
use rustc_hash::FxHashSet;

/// Operand stack with the canonical 1024-word limit.
#[derive(Debug, Default, Clone)]
pub struct Stack {
    values: Vec<U256>,
}

impl Stack {
    pub fn push(&mut self, value: U256) -> Result<(), VMError> {
        if self.values.len() >= STACK_LIMIT {
            return Err(VMError::StackOverflow);
        }
        self.values.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<U256, VMError> {
        self.values.pop().ok_or(VMError::StackUnderflow)
    }

    /// DUPn: copies the n-th value from the top (1-based) onto the top.
    pub fn dup(&mut self, depth: usize) -> Result<(), VMError> {
        let len = self.values.len();
        if depth > len {
            return Err(VMError::StackUnderflow);
        }
        let value = self.values[len - depth];
        self.push(value)
    }

    /// SWAPn: swaps the top with the n-th value below it (1-based).
    pub fn swap(&mut self, depth: usize) -> Result<(), VMError> {
        let len = self.values.len();
        if depth >= len {
            return Err(VMError::StackUnderflow);
        }
        self.values.swap(len - 1, len - 1 - depth);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// JUMPDEST positions in `code`, skipping bytes that are push payloads.
fn jump_destinations(code: &[u8]) -> FxHashSet<usize> {
    let mut destinations = FxHashSet::default();
    let mut pc = 0;
    while pc < code.len() {
        let op = code[pc];
        if op == crate::opcodes::JUMPDEST {
            destinations.insert(pc);
        }
        if (crate::opcodes::PUSH1..=crate::opcodes::PUSH32).contains(&op) {
            pc += (op - crate::opcodes::PUSH1) as usize + 1;
        }
        pc += 1;
    }
    destinations
}

/// One level of the call stack: the code being run, who called it, what it
/// was given, and its scratch state.
#[derive(Debug)]
pub struct CallFrame {
    /// Immediate caller of this frame.
    pub msg_sender: Address,
    /// Account whose storage and balance this frame acts on.
    pub to: Address,
    pub code: Bytes,
    pub calldata: Bytes,
    /// Gas-token value the frame was invoked with.
    pub value: U256,
    pub gas_left: u64,
    pub pc: usize,
    pub stack: Stack,
    pub memory: Memory,
    /// Return data of the most recent completed sub-call.
    pub returndata: Bytes,
    /// Bytes produced by RETURN or REVERT.
    pub output: Bytes,
    valid_jumps: FxHashSet<usize>,
}

impl CallFrame {
    pub fn new(
        msg_sender: Address,
        to: Address,
        code: Bytes,
        calldata: Bytes,
        value: U256,
        gas_limit: u64,
    ) -> Self {
        let valid_jumps = jump_destinations(&code);
        CallFrame {
            msg_sender,
            to,
            code,
            calldata,
            value,
            gas_left: gas_limit,
            pc: 0,
            stack: Stack::default(),
            memory: Memory::default(),
            returndata: Bytes::new(),
            output: Bytes::new(),
            valid_jumps,
        }
    }

    /// Current opcode byte. Past the end of code decodes as STOP.
    pub fn current_opcode(&self) -> u8 {
        self.code.get(self.pc).copied().unwrap_or(crate::opcodes::STOP)
    }

    pub fn use_gas(&mut self, amount: u64) -> Result<(), VMError> {
        self.gas_left = self.gas_left.checked_sub(amount).ok_or(VMError::OutOfGas)?;
        Ok(())
    }

    pub fn refund_gas(&mut self, amount: u64) -> Result<(), VMError> {
        self.gas_left = self
            .gas_left
            .checked_add(amount)
            .ok_or(InternalError::GasOverflow)?;
        Ok(())
    }

    pub fn is_valid_jump(&self, destination: usize) -> bool {
        self.valid_jumps.contains(&destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes;

    #[test]
    fn stack_limits_are_enforced() {
        let mut stack = Stack::default();
        assert_eq!(stack.pop(), Err(VMError::StackUnderflow));
        for i in 0..STACK_LIMIT {
            stack.push(U256::from(i)).unwrap();
        }
        assert_eq!(stack.push(U256::zero()), Err(VMError::StackOverflow));
    }

    #[test]
    fn dup_and_swap_are_one_based() {
        let mut stack = Stack::default();
        stack.push(U256::from(1)).unwrap();
        stack.push(U256::from(2)).unwrap();
        stack.dup(2).unwrap();
        assert_eq!(stack.pop(), Ok(U256::from(1)));
        stack.swap(1).unwrap();
        assert_eq!(stack.pop(), Ok(U256::from(1)));
        assert_eq!(stack.pop(), Ok(U256::from(2)));
    }

    #[test]
    fn jumpdest_inside_push_payload_is_not_valid() {
        // PUSH2 0x5b5b; JUMPDEST
        let code = Bytes::from_static(&[0x61, 0x5b, 0x5b, opcodes::JUMPDEST]);
        let frame = CallFrame::new(
            Address::zero(),
            Address::zero(),
            code,
            Bytes::new(),
            U256::zero(),
            0,
        );
        assert!(!frame.is_valid_jump(1));
        assert!(!frame.is_valid_jump(2));
        assert!(frame.is_valid_jump(3));
    }

    #[test]
    fn pc_past_code_end_reads_stop() {
        let mut frame = CallFrame::new(
            Address::zero(),
            Address::zero(),
            Bytes::from_static(&[opcodes::ADD]),
            Bytes::new(),
            U256::zero(),
            0,
        );
        frame.pc = 5;
        assert_eq!(frame.current_opcode(), opcodes::STOP);
    }
}
