use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Validation-command overrides for one side of a repo.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CommandOverrides {
    pub build: Option<String>,
    pub test: Option<String>,
}

/// Optional per-repo configuration read from `.rev/config.toml`.
///
/// The verifier prefers these commands over its language-matrix defaults.
///
/// ```toml
/// [backend]
/// test = "pytest -q tests/unit"
///
/// [frontend]
/// build = "npm run build"
/// test = "npm test -- --run"
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RepoConfig {
    #[serde(default)]
    pub backend: CommandOverrides,
    #[serde(default)]
    pub frontend: CommandOverrides,
}

impl RepoConfig {
    /// Load from the given file; a missing file yields the default
    /// (no overrides), a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read repo config: {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("invalid repo config: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempdir().unwrap();
        let config = RepoConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, RepoConfig::default());
    }

    #[test]
    fn test_load_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[backend]\ntest = \"pytest -q tests/unit\"\n\n[frontend]\ntest = \"npm test -- --run\"\n",
        )
        .unwrap();
        let config = RepoConfig::load(&path).unwrap();
        assert_eq!(config.backend.test.as_deref(), Some("pytest -q tests/unit"));
        assert_eq!(config.frontend.test.as_deref(), Some("npm test -- --run"));
        assert!(config.backend.build.is_none());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backend\n").unwrap();
        assert!(RepoConfig::load(&path).is_err());
    }
}
