//! Frame memory: a byte vector that grows in 32-byte words and charges
//! the quadratic expansion cost on every growth.

use crate::{
    errors::{InternalError, VMError},
    gas_cost,
};
use ember_common::U256;

#[derive(Debug, Default, Clone)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Gas needed to make `[offset, offset + size)` addressable. Does not
    /// grow the memory; callers charge first, then resize.
    pub fn expansion_cost(&self, offset: usize, size: usize) -> Result<u64, VMError> {
        if size == 0 {
            return Ok(0);
        }
        let end = offset
            .checked_add(size)
            .ok_or(InternalError::ArithmeticOverflow)?;
        let target = end
            .checked_next_multiple_of(32)
            .ok_or(InternalError::ArithmeticOverflow)?;
        gas_cost::memory_expansion_cost(self.data.len(), target)
    }

    /// Makes `[offset, offset + size)` addressable without writing to it.
    /// Callers charge the expansion cost before growing.
    pub fn grow(&mut self, offset: usize, size: usize) -> Result<(), VMError> {
        self.resize(offset, size)
    }

    fn resize(&mut self, offset: usize, size: usize) -> Result<(), VMError> {
        if size == 0 {
            return Ok(());
        }
        let end = offset
            .checked_add(size)
            .ok_or(InternalError::ArithmeticOverflow)?;
        let target = end
            .checked_next_multiple_of(32)
            .ok_or(InternalError::ArithmeticOverflow)?;
        if target > self.data.len() {
            self.data.resize(target, 0);
        }
        Ok(())
    }

    pub fn load_word(&mut self, offset: usize) -> Result<U256, VMError> {
        self.resize(offset, 32)?;
        Ok(U256::from_big_endian(&self.data[offset..offset + 32]))
    }

    pub fn load_range(&mut self, offset: usize, size: usize) -> Result<Vec<u8>, VMError> {
        if size == 0 {
            return Ok(Vec::new());
        }
        self.resize(offset, size)?;
        Ok(self.data[offset..offset + size].to_vec())
    }

    pub fn store_word(&mut self, offset: usize, value: U256) -> Result<(), VMError> {
        self.resize(offset, 32)?;
        self.data[offset..offset + 32].copy_from_slice(&value.to_big_endian());
        Ok(())
    }

    pub fn store_byte(&mut self, offset: usize, value: u8) -> Result<(), VMError> {
        self.resize(offset, 1)?;
        self.data[offset] = value;
        Ok(())
    }

    /// Copies `data` to `offset`, zero-filling up to `size` when the source
    /// is shorter. This is the shared shape of the *COPY opcodes.
    pub fn store_data(&mut self, offset: usize, size: usize, data: &[u8]) -> Result<(), VMError> {
        if size == 0 {
            return Ok(());
        }
        self.resize(offset, size)?;
        let copy_len = data.len().min(size);
        self.data[offset..offset + copy_len].copy_from_slice(&data[..copy_len]);
        for byte in &mut self.data[offset + copy_len..offset + size] {
            *byte = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_in_words() {
        let mut memory = Memory::default();
        memory.store_byte(0, 0xaa).unwrap();
        assert_eq!(memory.len(), 32);
        memory.store_byte(32, 0xbb).unwrap();
        assert_eq!(memory.len(), 64);
    }

    #[test]
    fn word_round_trip() {
        let mut memory = Memory::default();
        memory.store_word(4, U256::from(0xdeadbeefu64)).unwrap();
        assert_eq!(memory.load_word(4).unwrap(), U256::from(0xdeadbeefu64));
        assert_eq!(memory.len(), 64);
    }

    #[test]
    fn store_data_zero_fills_tail() {
        let mut memory = Memory::default();
        memory.store_data(0, 4, &[1, 2]).unwrap();
        assert_eq!(memory.load_range(0, 4).unwrap(), vec![1, 2, 0, 0]);
    }

    #[test]
    fn expansion_cost_is_zero_for_covered_range() {
        let mut memory = Memory::default();
        memory.store_word(0, U256::one()).unwrap();
        assert_eq!(memory.expansion_cost(0, 32).unwrap(), 0);
        assert!(memory.expansion_cost(32, 32).unwrap() > 0);
    }
}
