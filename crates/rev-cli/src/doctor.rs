use anyhow::{Context, Result};
use std::path::PathBuf;

use rev_config::{RuntimeConfig, StateLayout};

/// Dev tools the verifier's validation matrix may want on PATH.
const OPTIONAL_BINARIES: &[&str] = &[
    "python", "pytest", "ruff", "mypy", "node", "npm", "npx", "go", "cargo",
];

/// Report workspace state, runtime config, and tooling availability.
pub fn run(workspace: Option<String>) -> Result<i32> {
    let root = match workspace {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    let layout = StateLayout::new(&root);
    let runtime = RuntimeConfig::from_env();

    println!("workspace root: {}", root.display());
    println!(
        "state dir:      {} ({})",
        layout.state_dir().display(),
        if layout.state_dir().exists() { "present" } else { "missing" }
    );
    println!(
        "repo config:    {} ({})",
        layout.repo_config_file().display(),
        if layout.repo_config_file().exists() { "present" } else { "absent" }
    );
    println!("execution mode: {:?}", runtime.execution_mode);
    println!("verify mode:    {:?}", runtime.verify_mode);
    println!("tdd enabled:    {}", runtime.tdd_enabled);

    println!("\noptional validation tooling:");
    for binary in OPTIONAL_BINARIES {
        let status = if binary_available(binary) { "ok" } else { "missing" };
        println!("  {binary:<8} {status}");
    }

    println!(
        "\nnote: the chat backend and the concrete workspace tools are supplied by \
         the embedding integration; without them `rev run` stops at planning."
    );
    Ok(0)
}

fn binary_available(binary: &str) -> bool {
    which::which(binary).is_ok()
}
