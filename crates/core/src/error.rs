use std::fmt;

use thiserror::Error;

/// Why a memory read could not be satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFault {
    /// The target is running; memory can only be read while it is stopped
    ProcessRunning,
    /// No mapped region covers the requested range
    Unmapped,
}

impl fmt::Display for MemoryFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryFault::ProcessRunning => write!(f, "process is not stopped"),
            MemoryFault::Unmapped => write!(f, "address is not mapped"),
        }
    }
}

#[derive(Error, Debug)]
pub enum LensError {
    #[error("Failed to read file: {0}")]
    FileReadError(#[from] std::io::Error),
    #[error("Failed to parse JSON: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Failed to load debug info: {0}")]
    DebugInfoError(String),
    #[error("Failed to read {length} bytes at 0x{address:x}: {fault}")]
    MemoryReadError {
        address: u64,
        length: usize,
        fault: MemoryFault,
    },
    #[error("Runtime call in target failed: {0}")]
    RuntimeCallFailure(String),
    #[error("Target could not be re-stopped after a runtime call")]
    SessionLost,
    #[error("Type not found: {0}")]
    TypeNotFound(String),
    #[error("Variable not found: {0}")]
    VariableNotFound(String),
    #[error("No frame at index {0}")]
    FrameNotFound(usize),
    #[error("No child member named {0}")]
    ChildNotFound(String),
    #[error("Cannot read member {0} through a null pointer")]
    NullDereference(String),
    #[error("Invalid expression: {0}")]
    ExpressionError(String),
    #[error("Value was resolved at stop {resolved} but the process is now at stop {current}")]
    StaleValue { resolved: u64, current: u64 },
    #[error("Value of type {0} has no scalar contents")]
    NotAScalar(String),
    #[error("No implementation of {selector} for {type_name}")]
    MethodNotFound { type_name: String, selector: String },
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl LensError {
    /// Errors that end the debugging session rather than a single resolution
    pub fn is_fatal(&self) -> bool {
        matches!(self, LensError::SessionLost)
    }
}
