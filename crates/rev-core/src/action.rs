use serde::{Deserialize, Serialize};

/// Closed set of task action kinds.
///
/// The partition (read-only / mutating / execution / misc) drives agent
/// routing, preflight coercion, and which verification handler runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    // Read-only
    Read,
    Analyze,
    Review,
    Research,
    Investigate,
    // Mutating
    Edit,
    Add,
    Create,
    CreateDirectory,
    Refactor,
    Delete,
    Rename,
    Fix,
    // Execution
    Test,
    Tool,
    Run,
    // Misc
    General,
    Doc,
}

pub const ALL_ACTIONS: &[ActionKind] = &[
    ActionKind::Read,
    ActionKind::Analyze,
    ActionKind::Review,
    ActionKind::Research,
    ActionKind::Investigate,
    ActionKind::Edit,
    ActionKind::Add,
    ActionKind::Create,
    ActionKind::CreateDirectory,
    ActionKind::Refactor,
    ActionKind::Delete,
    ActionKind::Rename,
    ActionKind::Fix,
    ActionKind::Test,
    ActionKind::Tool,
    ActionKind::Run,
    ActionKind::General,
    ActionKind::Doc,
];

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Analyze => "analyze",
            Self::Review => "review",
            Self::Research => "research",
            Self::Investigate => "investigate",
            Self::Edit => "edit",
            Self::Add => "add",
            Self::Create => "create",
            Self::CreateDirectory => "create_directory",
            Self::Refactor => "refactor",
            Self::Delete => "delete",
            Self::Rename => "rename",
            Self::Fix => "fix",
            Self::Test => "test",
            Self::Tool => "tool",
            Self::Run => "run",
            Self::General => "general",
            Self::Doc => "doc",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Self::Read | Self::Analyze | Self::Review | Self::Research | Self::Investigate
        )
    }

    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Edit
                | Self::Add
                | Self::Create
                | Self::CreateDirectory
                | Self::Refactor
                | Self::Delete
                | Self::Rename
                | Self::Fix
        )
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Test | Self::Tool | Self::Run)
    }

    /// Exact (case-insensitive) match against the canonical names.
    pub fn from_exact(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        ALL_ACTIONS.iter().copied().find(|a| a.as_str() == s)
    }

    /// Normalize a planner-emitted action label: canonical name, known
    /// alias, or a single-typo fuzzy match. Falls back to `General`.
    pub fn normalize(raw: &str) -> Self {
        let cleaned = raw.trim().trim_matches(['[', ']']).to_lowercase();
        let cleaned = cleaned.replace([' ', '-'], "_");

        if let Some(exact) = Self::from_exact(&cleaned) {
            return exact;
        }

        let aliased = match cleaned.as_str() {
            "create_dir" | "mkdir" | "make_directory" => Some(Self::CreateDirectory),
            "modify" | "update" | "change" | "patch" => Some(Self::Edit),
            "implement" | "write" | "new" => Some(Self::Add),
            "verify" | "check" | "inspect" => Some(Self::Review),
            "search" | "locate" | "find" => Some(Self::Research),
            "remove" => Some(Self::Delete),
            "move" => Some(Self::Rename),
            "tests" | "testing" | "pytest" => Some(Self::Test),
            "execute" | "command" | "cmd" => Some(Self::Run),
            "document" | "docs" | "documentation" => Some(Self::Doc),
            _ => None,
        };
        if let Some(kind) = aliased {
            return kind;
        }

        // One-typo tolerance against the canonical names (e.g. "refacter").
        for kind in ALL_ACTIONS {
            if edit_distance_at_most_one(&cleaned, kind.as_str()) {
                return *kind;
            }
        }

        Self::General
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// True when `a` and `b` differ by at most one edit (insert/delete/substitute).
fn edit_distance_at_most_one(a: &str, b: &str) -> bool {
    let (a, b): (Vec<char>, Vec<char>) = (a.chars().collect(), b.chars().collect());
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if long.len() - short.len() > 1 {
        return false;
    }
    if short.len() == long.len() {
        return short.iter().zip(long.iter()).filter(|(x, y)| x != y).count() <= 1;
    }
    // Lengths differ by one: allow a single skipped char in the longer string.
    let mut i = 0;
    let mut j = 0;
    let mut skipped = false;
    while i < short.len() && j < long.len() {
        if short[i] == long[j] {
            i += 1;
            j += 1;
        } else if skipped {
            return false;
        } else {
            skipped = true;
            j += 1;
        }
    }
    true
}
