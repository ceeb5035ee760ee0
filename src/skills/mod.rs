//! Skills: per-turn bundles of prompt text, tool declarations, an optional
//! code provider and optional remote tool servers.
//!
//! - [`SkillConfig`] describes one skill for one turn.
//! - [`ToolProviderRegistry`] caches loaded code providers across turns.
//! - [`SkillToolPreparer`] turns a turn's skills into ready tools and open
//!   remote sessions.

pub mod config;
pub mod fetch;
pub mod metrics;
pub mod preparer;
pub mod provider;
pub mod registry;

pub use config::{ProviderDescriptor, SkillConfig, ToolDeclaration, ToolTarget};
pub use fetch::{BundleFetcher, HttpBundleFetcher, bundle_url};
pub use metrics::{MetricStatus, SkillMetrics, TracingMetrics};
pub use preparer::{PreparedTools, SkillToolPreparer};
pub use provider::{ProviderLoader, SkillProvider};
pub use registry::ToolProviderRegistry;
