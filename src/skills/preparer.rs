//! Per-turn skill tool preparation.
//!
//! For each skill of the turn, in input order:
//!
//! 1. decide preload from the preload-name list;
//! 2. batch the remote servers of preloaded skills, defer the rest to the
//!    loader tool;
//! 3. skills without local tools only get their prompt preloaded;
//! 4. load the code provider through the public-owner gate;
//! 5. build local tool handles and register them with the loader tool;
//! 6. expose the handles of preloaded skills immediately.
//!
//! Finally the batched servers are connected as one session whose tools are
//! appended last. Nothing that goes wrong for a single skill or the remote
//! batch aborts the turn.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{DEFAULT_MCP_CONNECT_TIMEOUT, PUBLIC_OWNER_ID, SkillHostConfig};
use crate::context::TurnContext;
use crate::error::{Error, SkillsError};
use crate::skills::config::SkillConfig;
use crate::skills::fetch::{BundleFetcher, HttpBundleFetcher, bundle_url};
use crate::skills::metrics::SkillMetrics;
use crate::skills::registry::ToolProviderRegistry;
use crate::tools::builtin::LoadSkillTool;
use crate::tools::handle::ToolHandle;
use crate::tools::mcp::{
    McpClientFactory, McpServerConfig, RemoteClientFactory, RemoteToolClient,
    connect_remote_tools, safe_disconnect,
};
use crate::tools::wasm::{WasmProviderLoader, WasmToolRuntime};

/// Tools ready for the turn plus the sessions backing the remote ones.
///
/// The caller must close `sessions` once the turn is over, whatever its
/// outcome.
#[derive(Default)]
pub struct PreparedTools {
    pub tools: Vec<ToolHandle>,
    pub sessions: Vec<Box<dyn RemoteToolClient>>,
}

impl PreparedTools {
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Disconnect and drop every session. Errors are logged, not returned.
    pub async fn close_sessions(&mut self) {
        for mut session in self.sessions.drain(..) {
            safe_disconnect(session.as_mut()).await;
        }
    }
}

impl std::fmt::Debug for PreparedTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedTools")
            .field("tools", &self.tool_names())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

/// Orchestrates skill tool loading for conversation turns.
pub struct SkillToolPreparer {
    registry: Arc<ToolProviderRegistry>,
    fetcher: Arc<dyn BundleFetcher>,
    remote: Arc<dyn RemoteClientFactory>,
    remote_storage_url: Option<String>,
    public_owner_id: i64,
    connect_timeout: Duration,
}

impl SkillToolPreparer {
    pub fn new(
        registry: Arc<ToolProviderRegistry>,
        fetcher: Arc<dyn BundleFetcher>,
        remote: Arc<dyn RemoteClientFactory>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            remote,
            remote_storage_url: None,
            public_owner_id: PUBLIC_OWNER_ID,
            connect_timeout: DEFAULT_MCP_CONNECT_TIMEOUT,
        }
    }

    /// Wire up the production stack: WASM providers, HTTP bundle downloads
    /// and MCP remote servers.
    pub fn from_config(
        config: &SkillHostConfig,
        metrics: Arc<dyn SkillMetrics>,
    ) -> Result<Self, Error> {
        let runtime = Arc::new(WasmToolRuntime::new(config.wasm.clone())?);
        let loader = Arc::new(WasmProviderLoader::new(runtime));
        let registry = Arc::new(ToolProviderRegistry::new(loader, Arc::clone(&metrics)));
        let fetcher = Arc::new(HttpBundleFetcher::new(
            config.service_token.clone(),
            config.download_timeout,
        ));
        let remote = Arc::new(McpClientFactory::new(metrics));

        let mut preparer = Self::new(registry, fetcher, remote)
            .with_public_owner_id(config.public_owner_id)
            .with_connect_timeout(config.mcp_connect_timeout);
        preparer.remote_storage_url = config.remote_storage_url.clone();
        Ok(preparer)
    }

    pub fn with_remote_storage_url(mut self, url: impl Into<String>) -> Self {
        self.remote_storage_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_public_owner_id(mut self, owner_id: i64) -> Self {
        self.public_owner_id = owner_id;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ToolProviderRegistry> {
        &self.registry
    }

    /// Factory for remote clients, for wiring the loader tool's lazy
    /// activation to the same servers.
    pub fn remote_factory(&self) -> Arc<dyn RemoteClientFactory> {
        Arc::clone(&self.remote)
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Prepare the tools of one turn.
    ///
    /// Fails only for malformed input (empty or duplicate skill names), and
    /// then before anything is loaded or connected.
    #[tracing::instrument(
        skip_all,
        fields(
            task_id = ctx.task_id,
            subtask_id = ctx.subtask_id,
            user_id = ctx.user_id,
            skills = skills.len()
        )
    )]
    pub async fn prepare(
        &self,
        ctx: &TurnContext,
        skills: &[SkillConfig],
        preload_names: Option<&[String]>,
        user_selected_names: Option<&[String]>,
        loader: Option<&LoadSkillTool>,
    ) -> Result<PreparedTools, SkillsError> {
        validate_names(skills)?;

        let contains =
            |names: Option<&[String]>, name: &str| names.is_some_and(|n| n.iter().any(|x| x == name));

        let mut prepared = PreparedTools::default();
        let mut batch: BTreeMap<String, McpServerConfig> = BTreeMap::new();
        let mut batch_owners: BTreeMap<String, String> = BTreeMap::new();

        for skill in skills {
            let should_preload = contains(preload_names, &skill.name);
            let is_user_selected = contains(user_selected_names, &skill.name);
            tracing::debug!(
                skill = %skill.name,
                tools = skill.tools.len(),
                has_provider = skill.provider.is_some(),
                should_preload,
                "Processing skill"
            );

            if skill.has_mcp_servers() {
                let servers = skill.prefixed_mcp_servers();
                if should_preload {
                    tracing::info!(skill = %skill.name, servers = servers.len(), "Batching MCP servers of preloaded skill");
                    batch_owners.extend(servers.keys().map(|s| (s.clone(), skill.name.clone())));
                    batch.extend(servers);
                } else if let Some(loader) = loader {
                    tracing::debug!(skill = %skill.name, "Deferring MCP servers until the skill is loaded");
                    loader.defer_remote_servers(&skill.name, servers).await;
                }
            }

            if !skill.has_local_tools() {
                if should_preload && let Some(loader) = loader {
                    loader
                        .preload_skill_prompt(&skill.name, skill, is_user_selected)
                        .await;
                }
                continue;
            }

            if skill.provider.is_some() {
                self.load_provider(skill).await;
            }

            let handles = self.registry.create_tools_for_skill(skill, ctx).await;
            if !handles.is_empty() {
                tracing::info!(
                    skill = %skill.name,
                    tools = ?handles.iter().map(|t| t.name()).collect::<Vec<_>>(),
                    "Created skill tools"
                );
            }

            if let Some(loader) = loader {
                loader.register_skill_tools(&skill.name, handles.clone()).await;
            }

            if should_preload {
                prepared.tools.extend(handles);
                if let Some(loader) = loader {
                    loader
                        .preload_skill_prompt(&skill.name, skill, is_user_selected)
                        .await;
                }
            }
        }

        if !batch.is_empty()
            && let Some(session) = self.load_batch(batch, ctx).await
        {
            let remote_tools = session.get_tools();
            if let Some(loader) = loader {
                let mut by_skill: BTreeMap<&str, Vec<ToolHandle>> = BTreeMap::new();
                for tool in &remote_tools {
                    if let Some(owner) = batch_owners.get(tool.owner()) {
                        by_skill.entry(owner.as_str()).or_default().push(tool.clone());
                    }
                }
                for (skill, tools) in by_skill {
                    loader.register_remote_tools(skill, tools).await;
                }
            }
            prepared.tools.extend(remote_tools);
            prepared.sessions.push(session);
        }

        tracing::info!(
            tools = prepared.tools.len(),
            sessions = prepared.sessions.len(),
            "Skill tools prepared"
        );
        Ok(prepared)
    }

    /// Run the provider of `skill` through the owner gate, download and
    /// registry. Returns whether a provider is available afterwards.
    async fn load_provider(&self, skill: &SkillConfig) -> bool {
        let Some(descriptor) = skill.provider.as_ref() else {
            return false;
        };

        if !skill.is_public(self.public_owner_id) {
            tracing::warn!(
                skill = %skill.name,
                owner = ?skill.owner_id,
                "SECURITY: skipping code loading for non-public skill"
            );
            return self
                .registry
                .ensure_provider_loaded(&skill.name, descriptor, &[], false)
                .await;
        }

        if self.registry.is_loaded(&skill.name).await {
            return true;
        }

        let Some(skill_id) = skill.skill_id else {
            tracing::warn!(skill = %skill.name, "Provider declared without a skill id; no bundle to load");
            return false;
        };
        let Some(base) = self.remote_storage_url.as_deref() else {
            tracing::warn!(skill = %skill.name, skill_id, "Remote storage URL not configured; cannot download bundle");
            return false;
        };

        let url = bundle_url(base, skill_id);
        let bundle = match self.fetcher.fetch(&url).await {
            Ok(bundle) => bundle,
            Err(e) => {
                tracing::error!(skill = %skill.name, skill_id, error = %e, "Failed to download skill bundle");
                return false;
            }
        };

        let loaded = self
            .registry
            .ensure_provider_loaded(&skill.name, descriptor, &bundle, true)
            .await;
        if !loaded {
            tracing::warn!(skill = %skill.name, "Failed to load provider for skill");
        }
        loaded
    }

    /// Connect the batched servers of preloaded skills as one session.
    #[tracing::instrument(skip_all, fields(task_id = ctx.task_id, servers = servers.len()))]
    async fn load_batch(
        &self,
        servers: BTreeMap<String, McpServerConfig>,
        ctx: &TurnContext,
    ) -> Option<Box<dyn RemoteToolClient>> {
        tracing::info!(servers = ?servers.keys().collect::<Vec<_>>(), "Connecting skill MCP servers");
        match connect_remote_tools(self.remote.as_ref(), servers, ctx, self.connect_timeout).await {
            Ok(session) => {
                tracing::info!(tools = session.get_tools().len(), "Loaded MCP tools from skill servers");
                Some(session)
            }
            Err(e) => {
                tracing::error!(status = e.status(), error = %e, "Skill MCP servers unavailable for this turn");
                None
            }
        }
    }
}

impl std::fmt::Debug for SkillToolPreparer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillToolPreparer")
            .field("remote_storage_url", &self.remote_storage_url)
            .field("public_owner_id", &self.public_owner_id)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

fn validate_names(skills: &[SkillConfig]) -> Result<(), SkillsError> {
    let mut seen = HashSet::new();
    for skill in skills {
        if skill.name.trim().is_empty() {
            return Err(SkillsError::InvalidDefinition {
                reason: "Skill name cannot be empty".to_string(),
            });
        }
        if !seen.insert(skill.name.as_str()) {
            return Err(SkillsError::InvalidDefinition {
                reason: format!("Duplicate skill name '{}' in one turn", skill.name),
            });
        }
    }
    Ok(())
}
