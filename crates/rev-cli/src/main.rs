use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cli;
mod doctor;
mod memory_cmd;
mod run_cmd;

use cli::{Cli, Commands, MemoryCommands};

/// Exit codes: 0 success, 1 failure, 130 interrupted.
const EXIT_FAILURE: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // `run` also logs to <workspace>/.rev/logs/; other commands log to
    // stderr only. The appender guard must outlive the command.
    let _log_guard = init_tracing(cli.debug, log_dir_for(&cli.command));

    let code = match cli.command {
        Commands::Run {
            request,
            workspace,
            add_roots,
            read_only,
            resume,
            mode,
            max_steps,
        } => {
            run_cmd::run(run_cmd::RunArgs {
                request,
                workspace,
                add_roots,
                read_only,
                resume,
                mode,
                max_steps,
                format: cli.format,
            })
            .await?
        }
        Commands::Memory { command } => match command {
            MemoryCommands::Show { workspace } => memory_cmd::show(workspace)?,
            MemoryCommands::RecordFailure {
                title,
                symptom,
                fix,
                workspace,
            } => memory_cmd::record_failure(workspace, &title, &symptom, &fix)?,
        },
        Commands::Doctor { workspace } => doctor::run(workspace)?,
    };

    match code {
        0 => Ok(()),
        EXIT_INTERRUPTED => std::process::exit(EXIT_INTERRUPTED),
        _ => std::process::exit(EXIT_FAILURE),
    }
}

fn log_dir_for(command: &Commands) -> Option<PathBuf> {
    let Commands::Run { workspace, .. } = command else {
        return None;
    };
    let root = workspace
        .as_ref()
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())?;
    let layout = rev_config::StateLayout::new(&root);
    layout.ensure().ok()?;
    Some(layout.logs_dir())
}

fn init_tracing(
    debug: bool,
    log_dir: Option<PathBuf>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_filter = if debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "rev.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .try_init()
                .ok();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init()
                .ok();
            None
        }
    }
}
