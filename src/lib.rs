//! Skill and tool orchestration for chat agents.
//!
//! For each conversation turn, [`skills::SkillToolPreparer`] decides which
//! skills are preloaded, loads their sandboxed code providers (public skills
//! only), connects their MCP servers and returns the ready tool handles plus
//! the remote sessions the caller must close. Skills that are not preloaded
//! stay dormant until the model activates them through
//! [`tools::builtin::LoadSkillTool`].

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod skills;
pub mod tools;

pub use config::SkillHostConfig;
pub use context::TurnContext;
pub use error::{Error, Result};
