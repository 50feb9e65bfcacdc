use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const STATE_DIR_NAME: &str = ".rev";

/// Durable per-workspace state layout under `<root>/.rev/`.
///
/// All long-lived orchestrator state (memory, artifacts, sessions, logs)
/// is workspace-local; nothing is written outside the workspace.
#[derive(Debug, Clone)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            root: workspace_root.join(STATE_DIR_NAME),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.root
    }

    pub fn memory_dir(&self) -> PathBuf {
        self.root.join("memory")
    }

    pub fn project_memory_file(&self) -> PathBuf {
        self.memory_dir().join("project_summary.md")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join("artifacts")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(session_id)
    }

    pub fn checkpoint_file(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("checkpoint.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn repo_config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Create all state directories (idempotent).
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.memory_dir(),
            self.artifacts_dir(),
            self.sessions_dir(),
            self.logs_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create state dir: {}", dir.display()))?;
        }
        Ok(())
    }
}
