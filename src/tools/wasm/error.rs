//! Errors raised by the WASM provider sandbox.

use std::time::Duration;

/// WASM sandbox errors.
#[derive(Debug, thiserror::Error)]
pub enum WasmError {
    #[error("Engine creation failed: {0}")]
    EngineCreationFailed(String),

    #[error("Compilation failed: {0}")]
    CompilationFailed(String),

    #[error("Module imports are not permitted: {0}")]
    ImportsNotAllowed(String),

    #[error("Missing required export: {0}")]
    MissingExport(String),

    #[error("Bundle integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("Instantiation failed: {0}")]
    InstantiationFailed(String),

    #[error("Execution trapped: {0}")]
    Trap(String),

    #[error("Fuel exhausted after {limit} units")]
    FuelExhausted { limit: u64 },

    #[error("Guest memory access out of bounds: {0}")]
    MemoryAccess(String),

    #[error("Input too large: {size} bytes")]
    InputTooLarge { size: usize },

    #[error("Output too large: {size} bytes exceeds {max}")]
    OutputTooLarge { size: usize, max: usize },

    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Execution task panicked: {0}")]
    ExecutionPanicked(String),
}
