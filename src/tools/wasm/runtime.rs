//! WASM runtime for skill provider modules.
//!
//! Follows the principle: compile once at load, instantiate fresh per call.
//! A trap or fuel exhaustion discards the instance; nothing is reused.
//!
//! Guest ABI:
//! - `memory`: exported linear memory
//! - `alloc(len: i32) -> i32`: reserve `len` bytes for the JSON input
//! - one export per tool `(ptr: i32, len: i32) -> i64`, returning
//!   `(out_ptr << 32) | out_len` of a UTF-8 JSON result

use std::collections::BTreeSet;
use std::sync::Arc;

use wasmtime::{
    Config, Engine, ExternType, FuncType, Instance, Module, OptLevel, Store, StoreLimits,
    StoreLimitsBuilder, Trap, ValType,
};

use crate::tools::wasm::error::WasmError;
use crate::tools::wasm::limits::{MAX_OUTPUT_BYTES, ResourceLimits};

/// Export every provider module must carry for its linear memory.
pub const MEMORY_EXPORT: &str = "memory";

/// Export every provider module must carry for input allocation.
pub const ALLOC_EXPORT: &str = "alloc";

/// Configuration for the WASM runtime.
#[derive(Debug, Clone)]
pub struct WasmRuntimeConfig {
    /// Default resource limits for providers.
    pub default_limits: ResourceLimits,
    /// Cranelift optimization level.
    pub optimization_level: OptLevel,
}

impl Default for WasmRuntimeConfig {
    fn default() -> Self {
        Self {
            default_limits: ResourceLimits::default(),
            optimization_level: OptLevel::Speed,
        }
    }
}

impl WasmRuntimeConfig {
    /// Create a minimal config for testing.
    pub fn for_testing() -> Self {
        Self {
            default_limits: ResourceLimits::default()
                .with_memory(1024 * 1024)
                .with_fuel(100_000)
                .with_timeout(std::time::Duration::from_secs(5)),
            optimization_level: OptLevel::None,
        }
    }
}

/// A compiled provider module ready for instantiation.
#[derive(Debug)]
pub struct PreparedModule {
    /// Skill name the module was loaded for.
    pub name: String,
    module: Module,
    /// Function exports callable as tools.
    tool_exports: BTreeSet<String>,
    /// Resource limits for every call into this module.
    pub limits: ResourceLimits,
}

impl PreparedModule {
    pub fn has_export(&self, export: &str) -> bool {
        self.tool_exports.contains(export)
    }

    pub fn tool_exports(&self) -> impl Iterator<Item = &str> {
        self.tool_exports.iter().map(String::as_str)
    }
}

struct StoreState {
    limits: StoreLimits,
}

/// WASM provider runtime.
///
/// Owns the Wasmtime engine. Compiled modules are cached by the provider
/// registry, not here.
pub struct WasmToolRuntime {
    engine: Engine,
    config: WasmRuntimeConfig,
}

impl WasmToolRuntime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: WasmRuntimeConfig) -> Result<Self, WasmError> {
        let mut wasmtime_config = Config::new();

        // Fuel is the CPU bound; the tokio timeout is the wall-clock bound.
        wasmtime_config.consume_fuel(true);
        wasmtime_config.wasm_threads(false);
        wasmtime_config.cranelift_opt_level(config.optimization_level);
        wasmtime_config.debug_info(false);

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            WasmError::EngineCreationFailed(format!("Failed to create Wasmtime engine: {}", e))
        })?;

        Ok(Self { engine, config })
    }

    pub fn config(&self) -> &WasmRuntimeConfig {
        &self.config
    }

    /// Validate and compile a provider module.
    ///
    /// Rejects modules that import anything or lack the ABI exports.
    pub async fn prepare(
        &self,
        name: &str,
        wasm_bytes: &[u8],
        limits: Option<ResourceLimits>,
    ) -> Result<Arc<PreparedModule>, WasmError> {
        let name = name.to_string();
        let wasm_bytes = wasm_bytes.to_vec();
        let engine = self.engine.clone();
        let limits = limits.unwrap_or_else(|| self.config.default_limits.clone());

        // Compilation is synchronous and CPU-heavy.
        let prepared = tokio::task::spawn_blocking(move || {
            let module = Module::new(&engine, &wasm_bytes)
                .map_err(|e| WasmError::CompilationFailed(e.to_string()))?;

            let imports: Vec<String> = module
                .imports()
                .map(|i| format!("{}::{}", i.module(), i.name()))
                .collect();
            if !imports.is_empty() {
                return Err(WasmError::ImportsNotAllowed(imports.join(", ")));
            }

            let mut has_memory = false;
            let mut has_alloc = false;
            let mut tool_exports = BTreeSet::new();
            for export in module.exports() {
                match (export.name(), export.ty()) {
                    (MEMORY_EXPORT, ExternType::Memory(_)) => has_memory = true,
                    (ALLOC_EXPORT, ExternType::Func(_)) => has_alloc = true,
                    (other, ExternType::Func(ty)) if is_tool_signature(&ty) => {
                        tool_exports.insert(other.to_string());
                    }
                    (other, ExternType::Func(_)) => {
                        tracing::debug!(name = %name, export = other, "Skipping export without tool signature");
                    }
                    _ => {}
                }
            }
            if !has_memory {
                return Err(WasmError::MissingExport(MEMORY_EXPORT.to_string()));
            }
            if !has_alloc {
                return Err(WasmError::MissingExport(ALLOC_EXPORT.to_string()));
            }

            Ok(PreparedModule {
                name,
                module,
                tool_exports,
                limits,
            })
        })
        .await
        .map_err(|e| WasmError::ExecutionPanicked(format!("Preparation task panicked: {}", e)))??;

        tracing::info!(
            name = %prepared.name,
            exports = prepared.tool_exports.len(),
            "Prepared WASM provider"
        );

        Ok(Arc::new(prepared))
    }

    /// Call one tool export with a JSON input, in a fresh instance.
    pub async fn execute(
        &self,
        module: &Arc<PreparedModule>,
        export: &str,
        input: Vec<u8>,
    ) -> Result<Vec<u8>, WasmError> {
        let engine = self.engine.clone();
        let module = Arc::clone(module);
        let export = export.to_string();
        let timeout = module.limits.timeout;

        let task = tokio::task::spawn_blocking(move || run_export(&engine, &module, &export, &input));

        match tokio::time::timeout(timeout, task).await {
            Err(_) => Err(WasmError::Timeout(timeout)),
            Ok(Err(e)) => Err(WasmError::ExecutionPanicked(e.to_string())),
            Ok(Ok(result)) => result,
        }
    }
}

/// Tool exports take `(ptr: i32, len: i32)` and return a packed `i64`.
fn is_tool_signature(ty: &FuncType) -> bool {
    let params: Vec<ValType> = ty.params().collect();
    let results: Vec<ValType> = ty.results().collect();
    matches!(params.as_slice(), [ValType::I32, ValType::I32])
        && matches!(results.as_slice(), [ValType::I64])
}

fn run_export(
    engine: &Engine,
    module: &PreparedModule,
    export: &str,
    input: &[u8],
) -> Result<Vec<u8>, WasmError> {
    let fuel = module.limits.fuel;
    let map_trap = |e: wasmtime::Error| match e.downcast_ref::<Trap>() {
        Some(Trap::OutOfFuel) => WasmError::FuelExhausted { limit: fuel },
        _ => WasmError::Trap(e.to_string()),
    };

    let limits = StoreLimitsBuilder::new()
        .memory_size(usize::try_from(module.limits.memory_bytes).unwrap_or(usize::MAX))
        .instances(1)
        .build();
    let mut store = Store::new(engine, StoreState { limits });
    store.limiter(|state| &mut state.limits);
    store
        .set_fuel(fuel)
        .map_err(|e| WasmError::InstantiationFailed(e.to_string()))?;

    let instance = Instance::new(&mut store, &module.module, &[])
        .map_err(|e| WasmError::InstantiationFailed(e.to_string()))?;

    let memory = instance
        .get_memory(&mut store, MEMORY_EXPORT)
        .ok_or_else(|| WasmError::MissingExport(MEMORY_EXPORT.to_string()))?;
    let alloc = instance
        .get_typed_func::<i32, i32>(&mut store, ALLOC_EXPORT)
        .map_err(|e| WasmError::MissingExport(format!("{}: {}", ALLOC_EXPORT, e)))?;
    let func = instance
        .get_typed_func::<(i32, i32), i64>(&mut store, export)
        .map_err(|e| WasmError::MissingExport(format!("{}: {}", export, e)))?;

    let len = i32::try_from(input.len()).map_err(|_| WasmError::InputTooLarge { size: input.len() })?;
    let ptr = alloc.call(&mut store, len).map_err(map_trap)?;
    memory
        .write(&mut store, ptr as u32 as usize, input)
        .map_err(|e| WasmError::MemoryAccess(e.to_string()))?;

    let packed = func.call(&mut store, (ptr, len)).map_err(map_trap)? as u64;
    let out_ptr = (packed >> 32) as usize;
    let out_len = (packed & 0xFFFF_FFFF) as usize;
    if out_len > MAX_OUTPUT_BYTES {
        return Err(WasmError::OutputTooLarge {
            size: out_len,
            max: MAX_OUTPUT_BYTES,
        });
    }

    let mut output = vec![0u8; out_len];
    memory
        .read(&store, out_ptr, &mut output)
        .map_err(|e| WasmError::MemoryAccess(e.to_string()))?;
    Ok(output)
}

impl std::fmt::Debug for WasmToolRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmToolRuntime")
            .field("config", &self.config)
            .finish()
    }
}
