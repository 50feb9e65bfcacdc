use std::path::{Path, PathBuf};

use serde_json::Value;

use rev_core::context::ExecutionContext;

use crate::language::ProjectType;

/// Dev tools the verifier may auto-install when missing.
const INSTALLABLE: &[&str] = &["ruff", "mypy", "pytest", "eslint", "tsc", "vitest", "jest"];

/// What the guard decided for a missing tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallDecision {
    /// Run these commands (in order), then retry the original command.
    Install(Vec<String>),
    /// An install was already attempted for the current manifest state.
    AlreadyAttempted,
    /// The tool is not one we auto-install, or installs are disabled.
    Skip,
}

/// Auto-install guard. Retry eligibility is keyed on the dependency
/// manifest's mtime: repeated attempts with an unchanged manifest are
/// refused, so a broken install cannot loop.
pub fn decide_install(
    tool: &str,
    project: ProjectType,
    workspace_root: &Path,
    ctx: &mut ExecutionContext,
    allow_auto_install: bool,
) -> InstallDecision {
    if !allow_auto_install || !INSTALLABLE.contains(&tool) {
        return InstallDecision::Skip;
    }

    let manifest = manifest_for(project, workspace_root);
    let mtime = manifest
        .as_deref()
        .and_then(manifest_mtime_secs)
        .unwrap_or(0);
    let state_key = format!(
        "install_attempt::{}",
        manifest
            .as_deref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("none::{tool}"))
    );

    if ctx.state_i64(&state_key) == Some(mtime) {
        return InstallDecision::AlreadyAttempted;
    }
    ctx.set_state(&state_key, Value::from(mtime));

    let mut commands = Vec::new();
    match project {
        ProjectType::Python => {
            commands.push(format!("pip install {tool}"));
        }
        p if p.is_node_family() => {
            // node-local dev tools need a package.json to attach to.
            if !workspace_root.join("package.json").exists() {
                commands.push("npm init -y".to_string());
            }
            commands.push(format!("npm install --save-dev {}", npm_package_for(tool)));
        }
        _ => return InstallDecision::Skip,
    }
    InstallDecision::Install(commands)
}

fn npm_package_for(tool: &str) -> &str {
    match tool {
        "tsc" => "typescript",
        other => other,
    }
}

fn manifest_for(project: ProjectType, root: &Path) -> Option<PathBuf> {
    let candidates: &[&str] = match project {
        ProjectType::Python => &["pyproject.toml", "requirements.txt", "setup.py"],
        p if p.is_node_family() => &["package.json"],
        _ => return None,
    };
    candidates
        .iter()
        .map(|name| root.join(name))
        .find(|p| p.exists())
}

fn manifest_mtime_secs(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let secs = modified
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_secs();
    Some(secs as i64)
}

/// Whether `binary` is on PATH.
pub fn tool_available(binary: &str) -> bool {
    which::which(binary).is_ok()
}
