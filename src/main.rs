use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use skillhost::cli::{Cli, Command, run_inspect_command, run_prepare_command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("skillhost=info"));
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    match cli.command {
        Command::Prepare {
            configs,
            preload,
            selected,
            load,
            task_id,
            subtask_id,
            user_id,
            user_name,
        } => {
            run_prepare_command(
                &configs, &preload, &selected, &load, task_id, subtask_id, user_id, &user_name,
            )
            .await
        }
        Command::Inspect { configs } => run_inspect_command(&configs),
    }
}
