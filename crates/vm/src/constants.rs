pub const STACK_LIMIT: usize = 1024;
pub const MAX_CALL_DEPTH: usize = 1024;

/// Runtime code larger than this fails deployment.
pub const MAX_CODE_SIZE: usize = 24576;

pub const WORD_SIZE: usize = 32;

/// Gas handed to the callee on top of the forwarded amount when a call
/// transfers value.
pub const CALL_STIPEND: u64 = 2300;
