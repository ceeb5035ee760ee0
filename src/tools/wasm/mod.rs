//! WASM sandbox for skill code providers.
//!
//! - **Compile once, instantiate fresh**: a bundle is validated and compiled
//!   when the skill's provider is loaded. Each tool call gets a new instance.
//!
//! - **Fuel metering**: CPU usage per call is limited via Wasmtime's fuel.
//!
//! - **Memory limits**: linear memory growth is bounded via `StoreLimits`.
//!
//! - **No host API**: modules that import anything are rejected.
//!
//! # Security Constraints
//!
//! | Threat | Mitigation |
//! |--------|------------|
//! | CPU exhaustion | Fuel metering |
//! | Memory exhaustion | Store limits, 10MB default |
//! | Hung calls | tokio timeout |
//! | Host access | Import-free modules only |
//! | Trap recovery | Discard instance, never reuse |
//! | Bundle tampering | SHA-256 verification on load |

mod error;
mod limits;
mod provider;
mod runtime;

pub use error::WasmError;
pub use limits::{DEFAULT_FUEL_LIMIT, DEFAULT_MEMORY_LIMIT, DEFAULT_TIMEOUT, MAX_OUTPUT_BYTES, ResourceLimits};
pub use provider::{WasmProvider, WasmProviderLoader, verify_integrity};
pub use runtime::{ALLOC_EXPORT, MEMORY_EXPORT, PreparedModule, WasmRuntimeConfig, WasmToolRuntime};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wasm_runtime_config_default() {
        let config = WasmRuntimeConfig::default();
        assert_eq!(config.default_limits.fuel, DEFAULT_FUEL_LIMIT);
        assert_eq!(config.default_limits.memory_bytes, DEFAULT_MEMORY_LIMIT);
        assert_eq!(config.default_limits.timeout, DEFAULT_TIMEOUT);
    }
}
