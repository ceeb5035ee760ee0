//! The `load_skill` tool: lets the model activate dormant skills mid-turn.
//!
//! Every skill of the turn is registered here by the preparer. Preloaded
//! skills start `Active`; the rest stay `Dormant` until the model asks for
//! them. Activation is one-way and idempotent: a skill's prompt is injected
//! at most once and its tools are never handed out twice.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::context::TurnContext;
use crate::error::ToolError;
use crate::skills::config::SkillConfig;
use crate::tools::handle::ToolHandle;
use crate::tools::mcp::{McpServerConfig, RemoteClientFactory, RemoteToolClient, connect_remote_tools};
use crate::tools::tool::{Tool, ToolOutput};

/// Name the model calls the loader by.
pub const LOAD_SKILL_TOOL_NAME: &str = "load_skill";

/// Activation state of one skill within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillState {
    /// Registered; tools not callable, prompt not injected.
    Dormant,
    /// Tools callable, prompt injected.
    Active,
}

/// Result of one activation request.
#[derive(Debug, Clone)]
pub struct ActivationOutcome {
    pub skill: String,
    /// True when the skill was already active; nothing changed.
    pub already_active: bool,
    /// Local and remote tools of the skill.
    pub tools: Vec<ToolHandle>,
    /// Prompt text of the skill, empty if it has none.
    pub prompt: String,
    /// Non-fatal problem met while activating, e.g. a remote connect failure.
    pub note: Option<String>,
}

struct SkillEntry {
    name: String,
    prompt: String,
    label: String,
    tools: Vec<ToolHandle>,
    remote_tools: Vec<ToolHandle>,
    deferred_servers: BTreeMap<String, McpServerConfig>,
    state: SkillState,
    preloaded: bool,
    activating: Arc<Mutex<()>>,
}

impl SkillEntry {
    fn from_config(config: &SkillConfig) -> Self {
        Self {
            name: config.name.clone(),
            prompt: config.prompt.clone(),
            label: config.label().to_string(),
            tools: Vec::new(),
            remote_tools: Vec::new(),
            deferred_servers: BTreeMap::new(),
            state: SkillState::Dormant,
            preloaded: false,
            activating: Arc::new(Mutex::new(())),
        }
    }

    fn all_tools(&self) -> Vec<ToolHandle> {
        self.tools.iter().chain(&self.remote_tools).cloned().collect()
    }

    fn already_active(&self) -> ActivationOutcome {
        ActivationOutcome {
            skill: self.name.clone(),
            already_active: true,
            tools: self.all_tools(),
            prompt: self.prompt.clone(),
            note: None,
        }
    }
}

struct InjectedPrompt {
    label: String,
    prompt: String,
    user_selected: bool,
}

#[derive(Default)]
struct LoaderState {
    skills: Vec<SkillEntry>,
    injected: Vec<(String, InjectedPrompt)>,
    sessions: Vec<Box<dyn RemoteToolClient>>,
}

impl LoaderState {
    fn entry_mut(&mut self, name: &str) -> Option<&mut SkillEntry> {
        self.skills.iter_mut().find(|s| s.name == name)
    }

    fn entry_or_insert(&mut self, name: &str) -> &mut SkillEntry {
        let index = match self.skills.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.skills.push(SkillEntry::from_config(&SkillConfig::new(name)));
                self.skills.len() - 1
            }
        };
        &mut self.skills[index]
    }

    /// Record the prompt once; later calls for the same skill are ignored.
    fn inject(&mut self, name: &str, label: &str, prompt: &str, user_selected: bool) -> bool {
        if prompt.is_empty() || self.injected.iter().any(|(skill, _)| skill == name) {
            return false;
        }
        self.injected.push((
            name.to_string(),
            InjectedPrompt {
                label: label.to_string(),
                prompt: prompt.to_string(),
                user_selected,
            },
        ));
        true
    }
}

struct RemoteActivation {
    factory: Arc<dyn RemoteClientFactory>,
    timeout: Duration,
}

/// Model-facing tool that activates dormant skills.
pub struct LoadSkillTool {
    user_id: i64,
    description: String,
    remote: Option<RemoteActivation>,
    state: Mutex<LoaderState>,
}

/// Build the loader for a turn, or `None` when the turn has no skills.
///
/// Skills named in `preload_names` are still registered but left out of the
/// tool description, since they are active from the start.
pub fn prepare_load_skill_tool(
    user_id: i64,
    skills: &[SkillConfig],
    preload_names: Option<&[String]>,
) -> Option<LoadSkillTool> {
    if skills.is_empty() {
        tracing::debug!(user_id, "No skills configured; load_skill not offered");
        return None;
    }
    let tool = LoadSkillTool::new(user_id, skills, preload_names);
    tracing::info!(
        user_id,
        skills = ?skills.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        "Created load_skill tool"
    );
    Some(tool)
}

impl LoadSkillTool {
    pub fn new(user_id: i64, skills: &[SkillConfig], preload_names: Option<&[String]>) -> Self {
        let is_preloaded =
            |name: &str| preload_names.is_some_and(|p| p.iter().any(|n| n == name));

        let mut description = String::from(
            "Load a skill to gain its specialized instructions and tools. \
             Call this when the task matches one of the skills below.\n\nAvailable skills:",
        );
        for skill in skills.iter().filter(|s| !is_preloaded(&s.name)) {
            description.push_str(&format!("\n- {}", skill.name));
            if !skill.description.is_empty() {
                description.push_str(&format!(": {}", skill.description));
            }
        }

        Self {
            user_id,
            description,
            remote: None,
            state: Mutex::new(LoaderState {
                skills: skills.iter().map(SkillEntry::from_config).collect(),
                ..Default::default()
            }),
        }
    }

    /// Enable connecting deferred remote servers during activation.
    pub fn with_remote(mut self, factory: Arc<dyn RemoteClientFactory>, timeout: Duration) -> Self {
        self.remote = Some(RemoteActivation { factory, timeout });
        self
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Register the handles built for a skill, active or not.
    pub async fn register_skill_tools(&self, skill: &str, tools: Vec<ToolHandle>) {
        let mut state = self.state.lock().await;
        tracing::debug!(skill, count = tools.len(), "Registered skill tools with loader");
        state.entry_or_insert(skill).tools = tools;
    }

    /// Record remote tools connected for a preloaded skill, so that loading
    /// it again reports them alongside its local tools.
    pub async fn register_remote_tools(&self, skill: &str, tools: Vec<ToolHandle>) {
        let mut state = self.state.lock().await;
        tracing::debug!(skill, count = tools.len(), "Registered remote skill tools with loader");
        state.entry_or_insert(skill).remote_tools = tools;
    }

    /// Remember remote servers to connect when the skill is activated.
    /// Names must already carry the skill prefix.
    pub async fn defer_remote_servers(&self, skill: &str, servers: BTreeMap<String, McpServerConfig>) {
        if servers.is_empty() {
            return;
        }
        let mut state = self.state.lock().await;
        state.entry_or_insert(skill).deferred_servers = servers;
    }

    /// Mark a preloaded skill `Active` and inject its prompt, once.
    pub async fn preload_skill_prompt(&self, skill: &str, config: &SkillConfig, is_user_selected: bool) {
        let mut state = self.state.lock().await;
        let entry = state.entry_or_insert(skill);
        entry.state = SkillState::Active;
        entry.preloaded = true;
        let label = entry.label.clone();
        if state.inject(skill, &label, &config.prompt, is_user_selected) {
            tracing::info!(skill, user_selected = is_user_selected, "Preloaded skill prompt");
        }
    }

    pub async fn state(&self, skill: &str) -> Option<SkillState> {
        self.state.lock().await.entry_mut(skill).map(|e| e.state)
    }

    /// Names of skills still dormant, in registration order.
    pub async fn dormant_skills(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .skills
            .iter()
            .filter(|s| s.state == SkillState::Dormant)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Activate a skill. Repeat calls return the same tools without
    /// reconnecting anything.
    ///
    /// Remote servers are connected without holding the loader state, so
    /// other skills stay usable meanwhile. Concurrent activations of one
    /// skill wait for each other. Deferred servers stay recorded until the
    /// connect finishes, so a cancelled activation can be retried.
    #[tracing::instrument(skip(self, ctx), fields(task_id = ctx.task_id))]
    pub async fn activate(&self, skill: &str, ctx: &TurnContext) -> Result<ActivationOutcome, ToolError> {
        let gate = {
            let mut state = self.state.lock().await;
            let available: Vec<String> = state.skills.iter().map(|s| s.name.clone()).collect();
            let Some(entry) = state.entry_mut(skill) else {
                return Err(ToolError::InvalidParameters {
                    name: LOAD_SKILL_TOOL_NAME.to_string(),
                    reason: format!(
                        "unknown skill '{}'; available skills: {}",
                        skill,
                        available.join(", ")
                    ),
                });
            };
            if entry.state == SkillState::Active {
                return Ok(entry.already_active());
            }
            Arc::clone(&entry.activating)
        };
        let _activating = gate.lock().await;

        let deferred = {
            let mut state = self.state.lock().await;
            let Some(entry) = state.entry_mut(skill) else {
                return Err(ToolError::NotFound {
                    name: skill.to_string(),
                });
            };
            if entry.state == SkillState::Active {
                return Ok(entry.already_active());
            }
            entry.deferred_servers.clone()
        };

        let mut note = None;
        let mut session = None;
        if !deferred.is_empty() {
            match &self.remote {
                Some(remote) => {
                    match connect_remote_tools(remote.factory.as_ref(), deferred, ctx, remote.timeout)
                        .await
                    {
                        Ok(client) => session = Some(client),
                        Err(e) => {
                            tracing::error!(skill, error = %e, "Remote servers failed during activation");
                            note = Some(format!(
                                "Remote tools for skill '{}' are unavailable ({}); continuing with its local tools.",
                                skill, e
                            ));
                        }
                    }
                }
                None => {
                    note = Some(format!(
                        "Remote tools for skill '{}' are not available in this session.",
                        skill
                    ));
                }
            }
        }

        let mut state = self.state.lock().await;
        let Some(entry) = state.entry_mut(skill) else {
            return Err(ToolError::NotFound {
                name: skill.to_string(),
            });
        };
        entry.deferred_servers.clear();
        if let Some(client) = &session {
            entry.remote_tools = client.get_tools();
        }
        entry.state = SkillState::Active;
        let tools = entry.all_tools();
        let prompt = entry.prompt.clone();
        let label = entry.label.clone();

        state.inject(skill, &label, &prompt, false);
        if let Some(client) = session {
            state.sessions.push(client);
        }

        tracing::info!(skill, tools = tools.len(), "Activated skill");
        Ok(ActivationOutcome {
            skill: skill.to_string(),
            already_active: false,
            tools,
            prompt,
            note,
        })
    }

    /// Tools of skills activated through this tool, in registration order.
    /// Preloaded skills are excluded; the preparer already returned theirs.
    pub async fn loaded_tools(&self) -> Vec<ToolHandle> {
        self.state
            .lock()
            .await
            .skills
            .iter()
            .filter(|s| s.state == SkillState::Active && !s.preloaded)
            .flat_map(|s| s.all_tools())
            .collect()
    }

    /// Hand over remote sessions opened by activations. The caller closes
    /// them at the end of the turn.
    pub async fn take_sessions(&self) -> Vec<Box<dyn RemoteToolClient>> {
        std::mem::take(&mut self.state.lock().await.sessions)
    }

    /// System prompt text for every injected skill prompt, in injection order.
    pub async fn system_prompt_additions(&self) -> String {
        let state = self.state.lock().await;
        state
            .injected
            .iter()
            .map(|(_, p)| {
                if p.user_selected {
                    format!(
                        "## Skill: {} [user selected]\nThe user explicitly selected this skill for this message; prioritize it.\n\n{}",
                        p.label, p.prompt
                    )
                } else {
                    format!("## Skill: {}\n\n{}", p.label, p.prompt)
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl std::fmt::Debug for LoadSkillTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadSkillTool")
            .field("user_id", &self.user_id)
            .field("remote", &self.remote.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for LoadSkillTool {
    fn name(&self) -> &str {
        LOAD_SKILL_TOOL_NAME
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "skill_name": {
                    "type": "string",
                    "description": "Name of the skill to load"
                }
            },
            "required": ["skill_name"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &TurnContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = std::time::Instant::now();

        let skill = params
            .get("skill_name")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidParameters {
                name: LOAD_SKILL_TOOL_NAME.to_string(),
                reason: "missing 'skill_name' parameter".to_string(),
            })?;

        let outcome = self.activate(skill.trim(), ctx).await?;
        let mut result = serde_json::json!({
            "skill": outcome.skill,
            "status": if outcome.already_active { "already_loaded" } else { "loaded" },
            "tools": outcome.tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
        });
        if !outcome.already_active && !outcome.prompt.is_empty() {
            result["instructions"] = serde_json::Value::String(outcome.prompt);
        }
        if let Some(note) = outcome.note {
            result["note"] = serde_json::Value::String(note);
        }
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::McpError;

    fn skill(name: &str, prompt: &str) -> SkillConfig {
        let mut config = SkillConfig::new(name);
        config.prompt = prompt.to_string();
        config.description = format!("{} things", name);
        config
    }

    /// Factory whose clients connect (or fail) without tools, counting
    /// every connect.
    struct CountingFactory {
        fail: bool,
        /// The first client ever created hangs in `connect`.
        hang_first: bool,
        connects: Arc<AtomicUsize>,
    }

    struct CountingClient {
        fail: bool,
        hang: bool,
        connected: bool,
        connects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RemoteToolClient for CountingClient {
        fn servers(&self) -> Vec<String> {
            vec!["docs_search".to_string()]
        }

        async fn connect(&mut self, _timeout: Duration) -> Result<(), McpError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if self.fail {
                return Err(McpError::ConnectionFailed {
                    server: "docs_search".to_string(),
                    reason: "refused".to_string(),
                });
            }
            self.connected = true;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn get_tools(&self) -> Vec<ToolHandle> {
            Vec::new()
        }

        async fn disconnect(&mut self) -> Result<(), McpError> {
            self.connected = false;
            Ok(())
        }
    }

    impl RemoteClientFactory for CountingFactory {
        fn create(
            &self,
            _servers: BTreeMap<String, McpServerConfig>,
            _ctx: &TurnContext,
        ) -> Box<dyn RemoteToolClient> {
            Box::new(CountingClient {
                fail: self.fail,
                hang: self.hang_first && self.connects.load(Ordering::SeqCst) == 0,
                connected: false,
                connects: Arc::clone(&self.connects),
            })
        }
    }

    fn deferred() -> BTreeMap<String, McpServerConfig> {
        let mut servers = BTreeMap::new();
        servers.insert(
            "docs_search".to_string(),
            McpServerConfig::Http {
                url: "http://search/mcp".to_string(),
                headers: BTreeMap::new(),
            },
        );
        servers
    }

    #[test]
    fn test_prepare_returns_none_without_skills() {
        assert!(prepare_load_skill_tool(1, &[], None).is_none());
    }

    #[test]
    fn test_description_lists_only_dormant_skills() {
        let skills = vec![skill("pdf", "p"), skill("web", "w")];
        let preload = vec!["pdf".to_string()];
        let tool = prepare_load_skill_tool(1, &skills, Some(&preload)).unwrap();

        assert_eq!(tool.name(), "load_skill");
        assert!(tool.description().contains("- web: web things"));
        assert!(!tool.description().contains("- pdf"));
        let required = tool.parameters_schema()["required"].clone();
        assert_eq!(required, serde_json::json!(["skill_name"]));
    }

    #[tokio::test]
    async fn test_activation_is_idempotent() {
        let tool = LoadSkillTool::new(1, &[skill("pdf", "Use pdf tools.")], None);
        let ctx = TurnContext::new(1, 1, 1);
        assert_eq!(tool.state("pdf").await, Some(SkillState::Dormant));

        let first = tool.activate("pdf", &ctx).await.unwrap();
        let second = tool.activate("pdf", &ctx).await.unwrap();

        assert!(!first.already_active);
        assert!(second.already_active);
        assert_eq!(tool.state("pdf").await, Some(SkillState::Active));
        assert_eq!(tool.system_prompt_additions().await.matches("Use pdf tools.").count(), 1);
    }

    #[tokio::test]
    async fn test_preloaded_prompt_injected_once_with_selection_marker() {
        let config = skill("pdf", "Use pdf tools.");
        let tool = LoadSkillTool::new(1, std::slice::from_ref(&config), None);

        tool.preload_skill_prompt("pdf", &config, true).await;
        tool.preload_skill_prompt("pdf", &config, true).await;
        let outcome = tool.activate("pdf", &TurnContext::new(1, 1, 1)).await.unwrap();

        assert!(outcome.already_active);
        let prompt = tool.system_prompt_additions().await;
        assert_eq!(prompt.matches("Use pdf tools.").count(), 1);
        assert!(prompt.starts_with("## Skill: pdf [user selected]"));
        assert!(tool.loaded_tools().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_skill_lists_available() {
        let tool = LoadSkillTool::new(1, &[skill("pdf", ""), skill("web", "")], None);
        let err = tool
            .execute(serde_json::json!({"skill_name": "sql"}), &TurnContext::new(1, 1, 1))
            .await
            .unwrap_err();
        match err {
            ToolError::InvalidParameters { reason, .. } => {
                assert!(reason.contains("sql"));
                assert!(reason.contains("pdf, web"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_parameter() {
        let tool = LoadSkillTool::new(1, &[skill("pdf", "")], None);
        let err = tool
            .execute(serde_json::json!({}), &TurnContext::new(1, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters { .. }));
    }

    #[tokio::test]
    async fn test_deferred_servers_connect_once() {
        let connects = Arc::new(AtomicUsize::new(0));
        let factory = Arc::new(CountingFactory {
            fail: false,
            hang_first: false,
            connects: Arc::clone(&connects),
        });
        let tool = LoadSkillTool::new(1, &[skill("docs", "Search docs.")], None)
            .with_remote(factory, Duration::from_secs(1));
        tool.defer_remote_servers("docs", deferred()).await;

        let ctx = TurnContext::new(1, 1, 1);
        let output = tool
            .execute(serde_json::json!({"skill_name": "docs"}), &ctx)
            .await
            .unwrap();
        assert_eq!(output.result["status"], "loaded");
        assert_eq!(output.result["instructions"], "Search docs.");

        let output = tool
            .execute(serde_json::json!({"skill_name": "docs"}), &ctx)
            .await
            .unwrap();
        assert_eq!(output.result["status"], "already_loaded");

        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(tool.take_sessions().await.len(), 1);
        assert!(tool.take_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_remote_connect_still_activates() {
        let factory = Arc::new(CountingFactory {
            fail: true,
            hang_first: false,
            connects: Arc::new(AtomicUsize::new(0)),
        });
        let tool = LoadSkillTool::new(1, &[skill("docs", "")], None)
            .with_remote(factory, Duration::from_secs(1));
        tool.defer_remote_servers("docs", deferred()).await;

        let outcome = tool.activate("docs", &TurnContext::new(1, 1, 1)).await.unwrap();
        assert_eq!(tool.state("docs").await, Some(SkillState::Active));
        assert!(outcome.note.unwrap().contains("unavailable"));
        assert!(tool.take_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_deferred_servers_without_remote_support() {
        let tool = LoadSkillTool::new(1, &[skill("docs", "")], None);
        tool.defer_remote_servers("docs", deferred()).await;

        let outcome = tool.activate("docs", &TurnContext::new(1, 1, 1)).await.unwrap();
        assert!(outcome.note.is_some());
        assert_eq!(tool.state("docs").await, Some(SkillState::Active));
    }

    #[tokio::test]
    async fn test_cancelled_activation_can_be_retried() {
        let connects = Arc::new(AtomicUsize::new(0));
        let factory = Arc::new(CountingFactory {
            fail: false,
            hang_first: true,
            connects: Arc::clone(&connects),
        });
        let tool = LoadSkillTool::new(1, &[skill("docs", "Search docs.")], None)
            .with_remote(factory, Duration::from_secs(10));
        tool.defer_remote_servers("docs", deferred()).await;
        let ctx = TurnContext::new(1, 1, 1);

        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), tool.activate("docs", &ctx)).await;
        assert!(cancelled.is_err());
        assert_eq!(tool.state("docs").await, Some(SkillState::Dormant));

        let outcome = tool.activate("docs", &ctx).await.unwrap();
        assert!(!outcome.already_active);
        assert!(outcome.note.is_none());
        assert_eq!(tool.state("docs").await, Some(SkillState::Active));
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(tool.take_sessions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_slow_connect_does_not_block_other_calls() {
        let factory = Arc::new(CountingFactory {
            fail: false,
            hang_first: true,
            connects: Arc::new(AtomicUsize::new(0)),
        });
        let tool = Arc::new(
            LoadSkillTool::new(1, &[skill("docs", ""), skill("pdf", "Use pdf tools.")], None)
                .with_remote(factory, Duration::from_secs(10)),
        );
        tool.defer_remote_servers("docs", deferred()).await;

        let pending = {
            let tool = Arc::clone(&tool);
            tokio::spawn(async move { tool.activate("docs", &TurnContext::new(1, 1, 1)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let other = tokio::time::timeout(
            Duration::from_millis(500),
            tool.activate("pdf", &TurnContext::new(1, 1, 1)),
        )
        .await
        .expect("unrelated activation must not wait for the slow connect")
        .unwrap();
        assert!(!other.already_active);
        let dormant = tokio::time::timeout(Duration::from_millis(500), tool.dormant_skills())
            .await
            .unwrap();
        assert_eq!(dormant, vec!["docs".to_string()]);

        pending.abort();
    }

    #[tokio::test]
    async fn test_preloaded_skill_reports_registered_remote_tools() {
        let config = skill("docs", "");
        let tool = LoadSkillTool::new(1, std::slice::from_ref(&config), None);
        let remote = ToolHandle::Remote(crate::tools::handle::RemoteToolHandle {
            server: "docs_search".to_string(),
            name: "docs_search__query".to_string(),
            remote_name: "query".to_string(),
            description: String::new(),
            schema: serde_json::json!({}),
            session: Arc::new(NamedCaller),
            metrics: Arc::new(crate::skills::metrics::TracingMetrics),
        });

        tool.register_remote_tools("docs", vec![remote]).await;
        tool.preload_skill_prompt("docs", &config, false).await;
        let outcome = tool.activate("docs", &TurnContext::new(1, 1, 1)).await.unwrap();

        assert!(outcome.already_active);
        let names: Vec<&str> = outcome.tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["docs_search__query"]);
    }

    struct NamedCaller;

    #[async_trait]
    impl crate::tools::mcp::RemoteToolCaller for NamedCaller {
        fn server_name(&self) -> &str {
            "docs_search"
        }

        async fn call_tool(&self, tool: &str, _args: &serde_json::Value) -> Result<String, McpError> {
            Ok(tool.to_string())
        }
    }
}
