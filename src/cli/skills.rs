//! Skill CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::config::SkillHostConfig;
use crate::context::TurnContext;
use crate::skills::{SkillConfig, SkillToolPreparer, TracingMetrics};
use crate::tools::builtin::prepare_load_skill_tool;
use crate::tools::mcp::safe_disconnect;

/// Read a JSON array of skill configs.
pub fn load_skill_configs(path: &Path) -> anyhow::Result<Vec<SkillConfig>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid skill configs in {}", path.display()))
}

/// Print the skills of a config file.
pub fn run_inspect_command(configs: &Path) -> anyhow::Result<()> {
    let skills = load_skill_configs(configs)?;
    let public_owner_id = SkillHostConfig::from_env()?.public_owner_id;

    println!("Skills in {}:", configs.display());
    for skill in &skills {
        let code = match (&skill.provider, skill.is_public(public_owner_id)) {
            (None, _) => "no code",
            (Some(_), true) => "code: public",
            (Some(_), false) => "code: denied (non-public owner)",
        };
        println!("  {} [{}] - {}", skill.name, code, skill.description);
        for tool in &skill.tools {
            println!("    - {} ({:?})", tool.name, tool.target);
        }
        for server in skill.prefixed_mcp_servers().keys() {
            println!("    * MCP server {}", server);
        }
    }
    if skills.is_empty() {
        println!("  (none)");
    }
    Ok(())
}

/// Prepare one turn end to end and close everything it opened.
#[allow(clippy::too_many_arguments)]
pub async fn run_prepare_command(
    configs: &Path,
    preload: &[String],
    selected: &[String],
    load: &[String],
    task_id: i64,
    subtask_id: i64,
    user_id: i64,
    user_name: &str,
) -> anyhow::Result<()> {
    let skills = load_skill_configs(configs)?;
    let config = SkillHostConfig::from_env()?;
    let preparer = SkillToolPreparer::from_config(&config, Arc::new(TracingMetrics))?;

    let ctx = TurnContext::new(task_id, subtask_id, user_id).with_user_name(user_name);
    let loader = prepare_load_skill_tool(user_id, &skills, Some(preload))
        .map(|l| l.with_remote(preparer.remote_factory(), preparer.connect_timeout()));

    let mut prepared = preparer
        .prepare(&ctx, &skills, Some(preload), Some(selected), loader.as_ref())
        .await?;

    println!("Active tools:");
    for tool in &prepared.tools {
        println!("  {} - {}", tool.name(), tool.description());
    }
    if prepared.tools.is_empty() {
        println!("  (none)");
    }
    println!("Open sessions: {}", prepared.sessions.len());

    if let Some(loader) = &loader {
        for name in load {
            match loader.activate(name, &ctx).await {
                Ok(outcome) => {
                    println!("Loaded skill '{}':", outcome.skill);
                    for tool in &outcome.tools {
                        println!("  {}", tool.name());
                    }
                    if let Some(note) = outcome.note {
                        println!("  note: {}", note);
                    }
                }
                Err(e) => println!("Could not load '{}': {}", name, e),
            }
        }

        println!("Dormant skills: {}", loader.dormant_skills().await.join(", "));
        let prompt = loader.system_prompt_additions().await;
        if !prompt.is_empty() {
            println!("\nSystem prompt additions:\n{}", prompt);
        }
    }

    prepared.close_sessions().await;
    if let Some(loader) = &loader {
        for mut session in loader.take_sessions().await {
            safe_disconnect(session.as_mut()).await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_load_skill_configs_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name": "pdf", "tools": [{{"name": "extract"}}]}}, {{"name": "web"}}]"#
        )
        .unwrap();

        let skills = load_skill_configs(file.path()).unwrap();
        assert_eq!(skills.len(), 2);
        assert_eq!(skills[0].tools[0].name, "extract");
    }

    #[test]
    fn test_load_skill_configs_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing.json");
        let err = load_skill_configs(&path).unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn test_load_skill_configs_rejects_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(load_skill_configs(file.path()).is_err());
    }
}
