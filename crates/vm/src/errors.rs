use bytes::Bytes;
use thiserror::Error;

/// Faults a transaction or nested frame can raise during execution.
///
/// Everything except `Internal` is a user-triggered error: it is returned
/// as a value to the calling frame, which decides whether to swallow it.
/// `ExecutionReverted` is the single fault that preserves its output and
/// does not burn the frame's remaining gas.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VMError {
    #[error("out of gas")]
    OutOfGas,
    #[error("max call depth exceeded")]
    CallDepthExceeded,
    #[error("insufficient balance for transfer")]
    InsufficientBalance,
    #[error("insufficient stake balance for transfer")]
    InsufficientStakeBalance,
    #[error("contract address collision")]
    ContractAddressCollision,
    #[error("contract creation code storage out of gas")]
    CodeStoreOutOfGas,
    #[error("max code size exceeded")]
    MaxCodeSizeExceeded,
    #[error("invalid gas limit")]
    InvalidGasLimit,
    #[error("no compatible interpreter")]
    NoCompatibleInterpreter,
    #[error("invalid stake operation")]
    InvalidStakeOperation,
    #[error("execution reverted")]
    ExecutionReverted,
    #[error("invalid jump destination")]
    InvalidJump,
    #[error("invalid opcode")]
    InvalidOpcode,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("stack overflow")]
    StackOverflow,
    #[error("write protection")]
    WriteProtection,
    #[error("return data out of bounds")]
    ReturnDataOutOfBounds,
    #[error("precompile rejected input: {0}")]
    Precompile(#[from] ember_crypto::CryptoError),
    #[error("internal error: {0}")]
    Internal(#[from] InternalError),
}

impl VMError {
    /// Internal invariant violations must bubble up and halt execution
    /// instead of being reported as a reverted frame.
    pub fn should_propagate(&self) -> bool {
        matches!(self, VMError::Internal(_))
    }
}

/// Invariant violations that are unreachable in correct code. These halt
/// the engine rather than producing a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    #[error("balance underflow")]
    BalanceUnderflow,
    #[error("balance overflow")]
    BalanceOverflow,
    #[error("nonce overflow")]
    NonceOverflow,
    #[error("gas accounting overflow")]
    GasOverflow,
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    #[error("corrupted staking pool record: {0}")]
    CorruptedPoolRecord(String),
    #[error("stake return mismatch: {0}")]
    StakeReturnMismatch(String),
}

/// Outcome of one frame (or of the whole transaction).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxResult {
    Success,
    Revert(VMError),
}

/// What a finished frame hands back to its caller: the result, the gas it
/// did not consume, and its output bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub result: TxResult,
    pub gas_left: u64,
    pub output: Bytes,
}

impl ExecutionReport {
    pub fn success(gas_left: u64, output: Bytes) -> Self {
        ExecutionReport {
            result: TxResult::Success,
            gas_left,
            output,
        }
    }

    /// A fault that did not execute anything: the caller keeps its gas.
    pub fn fault(error: VMError, gas_left: u64) -> Self {
        ExecutionReport {
            result: TxResult::Revert(error),
            gas_left,
            output: Bytes::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, TxResult::Success)
    }

    pub fn error(&self) -> Option<&VMError> {
        match &self.result {
            TxResult::Success => None,
            TxResult::Revert(e) => Some(e),
        }
    }
}

/// Control-flow signal from one interpreter step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeResult {
    Continue { pc_increment: usize },
    Halt,
}
