//! Opcode implementations, grouped the way the instruction table groups
//! them. Every handler charges its gas before touching any state.

mod arithmetic;
mod bitwise_comparison;
mod block;
mod environment;
mod keccak;
mod logging;
mod push_dup_swap;
mod stack_memory_storage_flow;
mod system;
