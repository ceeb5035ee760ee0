//! Built-in tools offered alongside skill tools.

mod load_skill;

pub use load_skill::{
    ActivationOutcome, LOAD_SKILL_TOOL_NAME, LoadSkillTool, SkillState, prepare_load_skill_tool,
};
