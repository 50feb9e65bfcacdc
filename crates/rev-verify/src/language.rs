use std::path::Path;

/// Project language/framework family, detected from manifests first and
/// file extensions second. Drives which validation matrix applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectType {
    Python,
    Node,
    Vue,
    React,
    NextJs,
    Go,
    Rust,
    Java,
    Ruby,
    CSharp,
    CMake,
    Dart,
    Unknown,
}

impl ProjectType {
    pub fn is_node_family(&self) -> bool {
        matches!(self, Self::Node | Self::Vue | Self::React | Self::NextJs)
    }
}

/// Walk up from `start` looking for a project manifest; fall back to the
/// file extension.
pub fn detect_project_type(start: &Path, workspace_root: &Path) -> ProjectType {
    let mut dir = if start.is_dir() {
        Some(start)
    } else {
        start.parent()
    };

    while let Some(current) = dir {
        if let Some(found) = detect_in_dir(current) {
            return found;
        }
        if current == workspace_root {
            break;
        }
        dir = current.parent();
    }

    by_extension(start)
}

fn detect_in_dir(dir: &Path) -> Option<ProjectType> {
    if dir.join("package.json").exists() {
        return Some(refine_node(dir));
    }
    if dir.join("pyproject.toml").exists()
        || dir.join("setup.py").exists()
        || dir.join("requirements.txt").exists()
    {
        return Some(ProjectType::Python);
    }
    if dir.join("go.mod").exists() {
        return Some(ProjectType::Go);
    }
    if dir.join("Cargo.toml").exists() {
        return Some(ProjectType::Rust);
    }
    if dir.join("pom.xml").exists() || dir.join("build.gradle").exists() {
        return Some(ProjectType::Java);
    }
    if dir.join("Gemfile").exists() {
        return Some(ProjectType::Ruby);
    }
    if has_ext_file(dir, "csproj") {
        return Some(ProjectType::CSharp);
    }
    if dir.join("CMakeLists.txt").exists() || dir.join("Makefile").exists() {
        return Some(ProjectType::CMake);
    }
    if dir.join("pubspec.yaml").exists() {
        return Some(ProjectType::Dart);
    }
    None
}

/// Distinguish vue/react/next from plain node via package.json contents.
fn refine_node(dir: &Path) -> ProjectType {
    let Ok(raw) = std::fs::read_to_string(dir.join("package.json")) else {
        return ProjectType::Node;
    };
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&raw) else {
        return ProjectType::Node;
    };
    let has_dep = |name: &str| {
        ["dependencies", "devDependencies"]
            .iter()
            .any(|section| parsed.get(section).and_then(|d| d.get(name)).is_some())
    };
    if has_dep("next") {
        return ProjectType::NextJs;
    }
    if has_dep("vue") {
        return ProjectType::Vue;
    }
    if has_dep("react") {
        return ProjectType::React;
    }
    ProjectType::Node
}

fn has_ext_file(dir: &Path, ext: &str) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .any(|e| e.path().extension().is_some_and(|x| x == ext))
        })
        .unwrap_or(false)
}

fn by_extension(path: &Path) -> ProjectType {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "py" | "pyi" => ProjectType::Python,
        "js" | "mjs" | "cjs" | "ts" | "tsx" | "jsx" => ProjectType::Node,
        "vue" => ProjectType::Vue,
        "go" => ProjectType::Go,
        "rs" => ProjectType::Rust,
        "java" => ProjectType::Java,
        "rb" => ProjectType::Ruby,
        "cs" => ProjectType::CSharp,
        "dart" => ProjectType::Dart,
        _ => ProjectType::Unknown,
    }
}

/// The default test command for a file, used when the loop injects a test
/// task after an inconclusive verification.
pub fn test_command_for(path: &str) -> &'static str {
    let lower = path.to_lowercase();
    if lower.ends_with(".py") {
        "pytest -q"
    } else if [".js", ".jsx", ".ts", ".tsx", ".vue", ".mjs", ".cjs"]
        .iter()
        .any(|ext| lower.ends_with(ext))
    {
        "npm test"
    } else if lower.ends_with(".go") {
        "go test ./..."
    } else if lower.ends_with(".rs") {
        "cargo test"
    } else {
        "pytest -q"
    }
}
