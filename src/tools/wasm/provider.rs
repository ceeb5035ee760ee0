//! WASM-backed skill providers.

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{SkillsError, ToolError};
use crate::skills::config::ProviderDescriptor;
use crate::skills::provider::{ProviderLoader, SkillProvider};
use crate::tools::wasm::error::WasmError;
use crate::tools::wasm::runtime::{PreparedModule, WasmToolRuntime};

/// A compiled provider module bound to the runtime that executes it.
#[derive(Debug)]
pub struct WasmProvider {
    runtime: Arc<WasmToolRuntime>,
    module: Arc<PreparedModule>,
}

impl WasmProvider {
    pub fn new(runtime: Arc<WasmToolRuntime>, module: Arc<PreparedModule>) -> Self {
        Self { runtime, module }
    }
}

#[async_trait]
impl SkillProvider for WasmProvider {
    fn skill_name(&self) -> &str {
        &self.module.name
    }

    fn has_export(&self, export: &str) -> bool {
        self.module.has_export(export)
    }

    async fn invoke(
        &self,
        export: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let input = serde_json::to_vec(params).map_err(|e| ToolError::InvalidParameters {
            name: export.to_string(),
            reason: e.to_string(),
        })?;

        let output = self
            .runtime
            .execute(&self.module, export, input)
            .await
            .map_err(|e| match e {
                WasmError::Timeout(timeout) => ToolError::Timeout {
                    name: export.to_string(),
                    timeout,
                },
                other => ToolError::Sandbox {
                    name: export.to_string(),
                    reason: other.to_string(),
                },
            })?;

        // Providers may return bare text instead of JSON.
        Ok(serde_json::from_slice(&output)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&output).into_owned())))
    }
}

/// Loads bundles as WASM modules after an optional integrity check.
#[derive(Debug, Clone)]
pub struct WasmProviderLoader {
    runtime: Arc<WasmToolRuntime>,
}

impl WasmProviderLoader {
    pub fn new(runtime: Arc<WasmToolRuntime>) -> Self {
        Self { runtime }
    }
}

/// Compare a bundle against an expected hex SHA-256.
pub fn verify_integrity(bundle: &[u8], expected: &str) -> Result<(), WasmError> {
    let actual = hex::encode(Sha256::digest(bundle));
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(WasmError::IntegrityMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

#[async_trait]
impl ProviderLoader for WasmProviderLoader {
    async fn load(
        &self,
        skill_name: &str,
        descriptor: &ProviderDescriptor,
        bundle: &[u8],
    ) -> Result<Arc<dyn SkillProvider>, SkillsError> {
        let load_failed = |e: WasmError| SkillsError::LoadFailed {
            name: skill_name.to_string(),
            reason: e.to_string(),
        };

        if let Some(expected) = descriptor.sha256.as_deref() {
            verify_integrity(bundle, expected).map_err(load_failed)?;
        }

        let mut limits = self.runtime.config().default_limits.clone();
        if let Some(fuel) = descriptor.fuel {
            limits = limits.with_fuel(fuel);
        }
        if let Some(memory) = descriptor.memory_bytes {
            limits = limits.with_memory(memory);
        }

        let module = self
            .runtime
            .prepare(skill_name, bundle, Some(limits))
            .await
            .map_err(load_failed)?;

        Ok(Arc::new(WasmProvider::new(Arc::clone(&self.runtime), module)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::wasm::runtime::WasmRuntimeConfig;
    use crate::tools::wasm::runtime::tests::ECHO_WAT;

    fn loader() -> WasmProviderLoader {
        let runtime = WasmToolRuntime::new(WasmRuntimeConfig::for_testing()).unwrap();
        WasmProviderLoader::new(Arc::new(runtime))
    }

    #[test]
    fn test_verify_integrity() {
        let digest = hex::encode(Sha256::digest(b"bundle"));
        assert!(verify_integrity(b"bundle", &digest).is_ok());
        assert!(verify_integrity(b"bundle", &digest.to_uppercase()).is_ok());
        assert!(matches!(
            verify_integrity(b"tampered", &digest),
            Err(WasmError::IntegrityMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_and_invoke_echo() {
        let provider = loader()
            .load("echo", &ProviderDescriptor::default(), ECHO_WAT.as_bytes())
            .await
            .unwrap();

        assert_eq!(provider.skill_name(), "echo");
        assert!(provider.has_export("echo"));
        assert!(!provider.has_export("missing"));

        let params = serde_json::json!({"message": "hello"});
        let result = provider.invoke("echo", &params).await.unwrap();
        assert_eq!(result, params);
    }

    #[tokio::test]
    async fn test_load_rejects_checksum_mismatch() {
        let descriptor = ProviderDescriptor {
            sha256: Some("00".repeat(32)),
            ..Default::default()
        };
        let err = loader()
            .load("echo", &descriptor, ECHO_WAT.as_bytes())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SkillsError::LoadFailed { ref name, .. } if name == "echo"));
        assert!(err.to_string().contains("integrity"));
    }

    #[tokio::test]
    async fn test_load_rejects_non_wasm() {
        let err = loader()
            .load("junk", &ProviderDescriptor::default(), b"not wasm at all")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SkillsError::LoadFailed { .. }));
    }

    #[tokio::test]
    async fn test_fuel_override_applies() {
        let descriptor = ProviderDescriptor {
            fuel: Some(5_000),
            ..Default::default()
        };
        let provider = loader()
            .load("echo", &descriptor, ECHO_WAT.as_bytes())
            .await
            .unwrap();

        let err = provider
            .invoke("spin", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Sandbox { ref reason, .. } if reason.contains("5000")));
    }
}
