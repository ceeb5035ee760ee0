//! CLI command handling.
//!
//! Provides subcommands for:
//! - Preparing a turn's skill tools against live storage and MCP servers (`prepare`)
//! - Listing what a skill config file declares without loading anything (`inspect`)

mod skills;

pub use skills::{load_skill_configs, run_inspect_command, run_prepare_command};

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "skillhost")]
#[command(about = "Load skill tools and MCP servers for a chat turn")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Prepare skill tools for one turn, print them, then close every session
    Prepare {
        /// JSON file holding an array of skill configs
        #[arg(long)]
        configs: PathBuf,

        /// Skill to preload (repeatable)
        #[arg(long = "preload", value_name = "NAME")]
        preload: Vec<String>,

        /// Skill the user explicitly selected (repeatable)
        #[arg(long = "selected", value_name = "NAME")]
        selected: Vec<String>,

        /// Activate a dormant skill through load_skill after preparing (repeatable)
        #[arg(long = "load", value_name = "NAME")]
        load: Vec<String>,

        #[arg(long, default_value_t = 0)]
        task_id: i64,

        #[arg(long, default_value_t = 0)]
        subtask_id: i64,

        #[arg(long, default_value_t = 0)]
        user_id: i64,

        #[arg(long, default_value = "")]
        user_name: String,
    },

    /// List the skills in a config file without loading anything
    Inspect {
        /// JSON file holding an array of skill configs
        #[arg(long)]
        configs: PathBuf,
    },
}
