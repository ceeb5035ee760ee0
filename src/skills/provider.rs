//! Seams between the registry and whatever executes a skill's local tools.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{SkillsError, ToolError};
use crate::skills::config::ProviderDescriptor;

/// A loaded code provider: the callable form of one skill's bundle.
#[async_trait]
pub trait SkillProvider: Send + Sync {
    /// Skill the provider was loaded for.
    fn skill_name(&self) -> &str;

    /// True if the provider implements `export`.
    fn has_export(&self, export: &str) -> bool;

    /// Run one export with JSON parameters.
    async fn invoke(
        &self,
        export: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError>;
}

/// Turns a downloaded bundle into a provider.
#[async_trait]
pub trait ProviderLoader: Send + Sync {
    async fn load(
        &self,
        skill_name: &str,
        descriptor: &ProviderDescriptor,
        bundle: &[u8],
    ) -> Result<Arc<dyn SkillProvider>, SkillsError>;
}
