//! Deterministic smart-contract execution engine for the Ember ledger.
//!
//! The engine runs a Constantinople-era instruction set over a dual-token
//! account model: every account carries a stake-token balance alongside
//! its gas-token balance, and a height-gated precompile registry bridges
//! contract execution into the staking pools.

pub mod call_frame;
pub mod constants;
pub mod db;
pub mod environment;
pub mod errors;
pub mod execute;
pub mod gas_cost;
pub mod memory;
mod opcode_handlers;
pub mod opcodes;
pub mod precompiles;
pub mod staking;
pub mod utils;
pub mod vm;

pub use db::{InMemoryStore, StateStore};
pub use environment::Environment;
pub use errors::{ExecutionReport, InternalError, TxResult, VMError};
pub use execute::{execute, ExecutionOutcome, Transaction};
pub use vm::{Evm, Log};
