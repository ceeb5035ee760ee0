//! Skill descriptors: the per-turn, immutable description of one skill.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tools::mcp::McpServerConfig;

/// One skill's configuration for a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillConfig {
    /// Unique name within the turn.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Prompt text injected when the skill becomes active.
    #[serde(default)]
    pub prompt: String,
    #[serde(default, alias = "display_name")]
    pub display_name: String,
    /// Declared tools, in declaration order.
    #[serde(default)]
    pub tools: Vec<ToolDeclaration>,
    /// Code provider shipped with the skill, if any.
    #[serde(default)]
    pub provider: Option<ProviderDescriptor>,
    /// Storage id used to locate the code bundle.
    #[serde(default, alias = "skill_id")]
    pub skill_id: Option<i64>,
    /// Owning user; the public owner id marks a system-published skill.
    #[serde(default, alias = "skillUserId", alias = "skill_user_id")]
    pub owner_id: Option<i64>,
    /// Remote tool servers, keyed by server name.
    #[serde(default, alias = "mcp_servers")]
    pub mcp_servers: Option<BTreeMap<String, McpServerConfig>>,
}

impl SkillConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            prompt: String::new(),
            display_name: String::new(),
            tools: Vec::new(),
            provider: None,
            skill_id: None,
            owner_id: None,
            mcp_servers: None,
        }
    }

    /// Declarations executed by the skill's code provider.
    pub fn local_tools(&self) -> impl Iterator<Item = &ToolDeclaration> {
        self.tools
            .iter()
            .filter(|t| matches!(t.target, ToolTarget::Local))
    }

    pub fn has_local_tools(&self) -> bool {
        self.local_tools().next().is_some()
    }

    pub fn has_mcp_servers(&self) -> bool {
        self.mcp_servers.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// MCP server configs keyed as `{skill}_{server}` so servers from
    /// different skills never collide once merged.
    pub fn prefixed_mcp_servers(&self) -> BTreeMap<String, McpServerConfig> {
        self.mcp_servers
            .iter()
            .flatten()
            .map(|(server, config)| (format!("{}_{}", self.name, server), config.clone()))
            .collect()
    }

    /// True if the skill is owned by the public/system owner.
    pub fn is_public(&self, public_owner_id: i64) -> bool {
        self.owner_id == Some(public_owner_id)
    }

    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

/// A tool declared by a skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the tool's parameters.
    #[serde(default = "default_parameters", alias = "parameters_schema")]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub target: ToolTarget,
    /// Provider export implementing the tool; defaults to the tool name.
    #[serde(default)]
    pub export: Option<String>,
}

impl ToolDeclaration {
    pub fn local(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: default_parameters(),
            target: ToolTarget::Local,
            export: None,
        }
    }

    pub fn export_name(&self) -> &str {
        self.export.as_deref().unwrap_or(&self.name)
    }
}

fn default_parameters() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Where a declared tool executes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolTarget {
    /// Exported by the skill's code provider.
    #[default]
    Local,
    /// Served by one of the skill's MCP servers; discovered at connect time.
    Remote { server: String },
}

/// Describes the code bundle backing a skill's local tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    /// Hex SHA-256 of the bundle; verified before compilation when present.
    #[serde(default)]
    pub sha256: Option<String>,
    /// Fuel budget per call, overriding the runtime default.
    #[serde(default)]
    pub fuel: Option<u64>,
    /// Linear memory cap per call in bytes, overriding the runtime default.
    #[serde(default)]
    pub memory_bytes: Option<u64>,
}
