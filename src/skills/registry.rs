//! Process-wide registry of loaded skill code providers.
//!
//! At most one load per skill name is in flight: concurrent callers for the
//! same name await one shared future and observe the same outcome. Loads of
//! different names run in parallel; no lock is held across a load. Failed
//! loads are never cached, so a later turn may try again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::{Mutex, RwLock};

use crate::context::TurnContext;
use crate::skills::config::{ProviderDescriptor, SkillConfig};
use crate::skills::metrics::{MetricStatus, SkillMetrics};
use crate::skills::provider::{ProviderLoader, SkillProvider};
use crate::tools::handle::{LocalToolHandle, ToolHandle};

type LoadFuture = Shared<BoxFuture<'static, bool>>;

/// Cache of loaded providers keyed by skill name.
pub struct ToolProviderRegistry {
    loader: Arc<dyn ProviderLoader>,
    metrics: Arc<dyn SkillMetrics>,
    providers: Arc<RwLock<HashMap<String, Arc<dyn SkillProvider>>>>,
    in_flight: Mutex<HashMap<String, LoadFuture>>,
}

impl ToolProviderRegistry {
    pub fn new(loader: Arc<dyn ProviderLoader>, metrics: Arc<dyn SkillMetrics>) -> Self {
        Self {
            loader,
            metrics,
            providers: Arc::new(RwLock::new(HashMap::new())),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Make sure a provider for `skill_name` is loaded.
    ///
    /// Returns false without inspecting `bundle` when `is_public` is false.
    /// Returns true immediately when a provider is already cached.
    #[tracing::instrument(skip(self, descriptor, bundle), fields(bundle_bytes = bundle.len()))]
    pub async fn ensure_provider_loaded(
        &self,
        skill_name: &str,
        descriptor: &ProviderDescriptor,
        bundle: &[u8],
        is_public: bool,
    ) -> bool {
        if !is_public {
            tracing::warn!(skill = %skill_name, "Refusing to load code for non-public skill");
            self.metrics.record_skill_load(
                skill_name,
                MetricStatus::Denied,
                std::time::Duration::ZERO,
            );
            return false;
        }

        let load = {
            let mut in_flight = self.in_flight.lock().await;
            if self.providers.read().await.contains_key(skill_name) {
                return true;
            }
            match in_flight.get(skill_name) {
                Some(existing) => existing.clone(),
                None => {
                    let load = self.spawn_load(skill_name, descriptor, bundle);
                    in_flight.insert(skill_name.to_string(), load.clone());
                    load
                }
            }
        };

        let loaded = load.clone().await;

        let mut in_flight = self.in_flight.lock().await;
        if in_flight
            .get(skill_name)
            .is_some_and(|current| current.ptr_eq(&load))
        {
            in_flight.remove(skill_name);
        }
        loaded
    }

    fn spawn_load(
        &self,
        skill_name: &str,
        descriptor: &ProviderDescriptor,
        bundle: &[u8],
    ) -> LoadFuture {
        let loader = Arc::clone(&self.loader);
        let metrics = Arc::clone(&self.metrics);
        let providers = Arc::clone(&self.providers);
        let skill_name = skill_name.to_string();
        let descriptor = descriptor.clone();
        let bundle = bundle.to_vec();

        async move {
            let start = Instant::now();
            match loader.load(&skill_name, &descriptor, &bundle).await {
                Ok(provider) => {
                    // Published before the shared future resolves, so waiters
                    // always find the provider cached.
                    providers.write().await.insert(skill_name.clone(), provider);
                    tracing::info!(skill = %skill_name, elapsed_ms = start.elapsed().as_millis() as u64, "Loaded skill provider");
                    metrics.record_skill_load(&skill_name, MetricStatus::Success, start.elapsed());
                    true
                }
                Err(e) => {
                    tracing::warn!(skill = %skill_name, error = %e, "Failed to load skill provider");
                    metrics.record_skill_load(&skill_name, MetricStatus::Error, start.elapsed());
                    false
                }
            }
        }
        .boxed()
        .shared()
    }

    pub async fn is_loaded(&self, skill_name: &str) -> bool {
        self.providers.read().await.contains_key(skill_name)
    }

    /// Names of every cached provider, sorted.
    pub async fn loaded_skills(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop a cached provider. The next `ensure_provider_loaded` reloads it.
    pub async fn evict(&self, skill_name: &str) -> bool {
        self.providers.write().await.remove(skill_name).is_some()
    }

    /// Bind the skill's local tool declarations to its cached provider.
    ///
    /// Declarations whose export the provider lacks are skipped, as is every
    /// declaration when no provider is cached. Remote-target declarations are
    /// never bound here.
    pub async fn create_tools_for_skill(
        &self,
        skill: &SkillConfig,
        ctx: &TurnContext,
    ) -> Vec<ToolHandle> {
        let Some(provider) = self.providers.read().await.get(&skill.name).cloned() else {
            if skill.has_local_tools() {
                tracing::debug!(skill = %skill.name, task_id = ctx.task_id, "No provider loaded; skipping local tools");
            }
            return Vec::new();
        };

        skill
            .local_tools()
            .filter_map(|decl| {
                let export = decl.export_name();
                if !provider.has_export(export) {
                    tracing::warn!(
                        skill = %skill.name,
                        tool = %decl.name,
                        export,
                        "Provider does not export declared tool"
                    );
                    return None;
                }
                Some(ToolHandle::Local(LocalToolHandle {
                    skill_name: skill.name.clone(),
                    name: decl.name.clone(),
                    description: decl.description.clone(),
                    schema: decl.parameters.clone(),
                    export: export.to_string(),
                    provider: Arc::clone(&provider),
                    metrics: Arc::clone(&self.metrics),
                }))
            })
            .collect()
    }
}

impl std::fmt::Debug for ToolProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolProviderRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{SkillsError, ToolError};
    use crate::skills::config::{ToolDeclaration, ToolTarget};
    use crate::skills::metrics::TracingMetrics;

    struct StaticProvider {
        skill: String,
        exports: Vec<&'static str>,
    }

    #[async_trait]
    impl SkillProvider for StaticProvider {
        fn skill_name(&self) -> &str {
            &self.skill
        }

        fn has_export(&self, export: &str) -> bool {
            self.exports.contains(&export)
        }

        async fn invoke(
            &self,
            export: &str,
            _params: &serde_json::Value,
        ) -> Result<serde_json::Value, ToolError> {
            Ok(serde_json::json!({ "export": export }))
        }
    }

    /// Loads bundles equal to `b"ok"`, slowly, counting every load.
    struct CountingLoader {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl ProviderLoader for CountingLoader {
        async fn load(
            &self,
            skill_name: &str,
            _descriptor: &ProviderDescriptor,
            bundle: &[u8],
        ) -> Result<Arc<dyn SkillProvider>, SkillsError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if bundle != b"ok" {
                return Err(SkillsError::LoadFailed {
                    name: skill_name.to_string(),
                    reason: "corrupt bundle".to_string(),
                });
            }
            Ok(Arc::new(StaticProvider {
                skill: skill_name.to_string(),
                exports: vec!["extract", "search"],
            }))
        }
    }

    fn registry() -> (Arc<ToolProviderRegistry>, Arc<CountingLoader>) {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
        });
        let registry = ToolProviderRegistry::new(loader.clone(), Arc::new(TracingMetrics));
        (Arc::new(registry), loader)
    }

    #[tokio::test]
    async fn test_concurrent_loads_coalesce() {
        let (registry, loader) = registry();
        let descriptor = ProviderDescriptor::default();

        let calls = (0..8).map(|_| {
            let registry = Arc::clone(&registry);
            let descriptor = descriptor.clone();
            tokio::spawn(async move {
                registry
                    .ensure_provider_loaded("pdf", &descriptor, b"ok", true)
                    .await
            })
        });
        let results = futures::future::join_all(calls).await;

        assert!(results.into_iter().all(|r| r.unwrap()));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert!(registry.is_loaded("pdf").await);
    }

    #[tokio::test]
    async fn test_concurrent_failures_coalesce_and_are_not_cached() {
        let (registry, loader) = registry();
        let descriptor = ProviderDescriptor::default();

        let (a, b) = tokio::join!(
            registry.ensure_provider_loaded("pdf", &descriptor, b"bad", true),
            registry.ensure_provider_loaded("pdf", &descriptor, b"bad", true),
        );
        assert!(!a && !b);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert!(!registry.is_loaded("pdf").await);

        // Nothing cached: the next attempt loads again.
        assert!(
            registry
                .ensure_provider_loaded("pdf", &descriptor, b"ok", true)
                .await
        );
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_public_denied_without_loading() {
        let (registry, loader) = registry();
        let loaded = registry
            .ensure_provider_loaded("pdf", &ProviderDescriptor::default(), b"ok", false)
            .await;

        assert!(!loaded);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
        assert!(registry.loaded_skills().await.is_empty());
    }

    #[tokio::test]
    async fn test_already_loaded_skips_reload() {
        let (registry, loader) = registry();
        let descriptor = ProviderDescriptor::default();

        assert!(registry.ensure_provider_loaded("pdf", &descriptor, b"ok", true).await);
        // A corrupt bundle is never looked at once a provider is cached.
        assert!(registry.ensure_provider_loaded("pdf", &descriptor, b"bad", true).await);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_names_load_independently() {
        let (registry, loader) = registry();
        let descriptor = ProviderDescriptor::default();

        let (a, b) = tokio::join!(
            registry.ensure_provider_loaded("pdf", &descriptor, b"ok", true),
            registry.ensure_provider_loaded("web", &descriptor, b"ok", true),
        );
        assert!(a && b);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
        assert_eq!(registry.loaded_skills().await, vec!["pdf", "web"]);
    }

    #[tokio::test]
    async fn test_evict_forces_reload() {
        let (registry, loader) = registry();
        let descriptor = ProviderDescriptor::default();

        registry.ensure_provider_loaded("pdf", &descriptor, b"ok", true).await;
        assert!(registry.evict("pdf").await);
        assert!(!registry.evict("pdf").await);
        registry.ensure_provider_loaded("pdf", &descriptor, b"ok", true).await;
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_create_tools_for_skill_binds_exported_local_tools() {
        let (registry, _) = registry();
        registry
            .ensure_provider_loaded("pdf", &ProviderDescriptor::default(), b"ok", true)
            .await;

        let mut skill = SkillConfig::new("pdf");
        skill.tools = vec![
            ToolDeclaration::local("extract", "Extract text"),
            ToolDeclaration::local("summarize", "Not exported"),
            ToolDeclaration {
                target: ToolTarget::Remote {
                    server: "index".to_string(),
                },
                ..ToolDeclaration::local("search", "Served remotely")
            },
        ];

        let tools = registry
            .create_tools_for_skill(&skill, &TurnContext::new(1, 1, 1))
            .await;
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["extract"]);

        let output = tools[0].invoke(serde_json::json!({})).await.unwrap();
        assert_eq!(output.result["export"], "extract");
    }

    #[tokio::test]
    async fn test_create_tools_without_provider_is_empty() {
        let (registry, _) = registry();
        let mut skill = SkillConfig::new("pdf");
        skill.tools = vec![ToolDeclaration::local("extract", "")];

        let tools = registry
            .create_tools_for_skill(&skill, &TurnContext::new(1, 1, 1))
            .await;
        assert!(tools.is_empty());
    }
}
