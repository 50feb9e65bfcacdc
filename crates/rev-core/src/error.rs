use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Closed taxonomy of tool-execution failures.
///
/// Every failure a tool or verifier reports is folded into one of these
/// kinds; the kind fixes the recovery contract (retryable, agent-recoverable,
/// or needs the user).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    Transient,
    Timeout,
    Network,
    NotFound,
    PermissionDenied,
    SyntaxError,
    ValidationError,
    Conflict,
    Unknown,
}

pub const ALL_ERROR_KINDS: &[ToolErrorKind] = &[
    ToolErrorKind::Transient,
    ToolErrorKind::Timeout,
    ToolErrorKind::Network,
    ToolErrorKind::NotFound,
    ToolErrorKind::PermissionDenied,
    ToolErrorKind::SyntaxError,
    ToolErrorKind::ValidationError,
    ToolErrorKind::Conflict,
    ToolErrorKind::Unknown,
];

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::NotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::SyntaxError => "syntax_error",
            Self::ValidationError => "validation_error",
            Self::Conflict => "conflict",
            Self::Unknown => "unknown",
        }
    }

    /// Retry without changing anything is a sensible recovery.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::Timeout | Self::Network)
    }

    /// The agent can recover without asking the user.
    pub fn recoverable_by_agent(&self) -> bool {
        self.is_retryable()
            || matches!(self, Self::NotFound | Self::SyntaxError | Self::ValidationError)
    }

    /// Resolution needs the user (permissions, conflicting state).
    pub fn requires_user_input(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::Conflict)
    }

    /// Default recovery budget: how many verification failures of this
    /// kind the loop absorbs before tripping the per-kind circuit breaker.
    pub fn default_recovery_budget(&self) -> u32 {
        match self {
            Self::Transient => 8,
            Self::Timeout => 6,
            Self::Network => 6,
            Self::NotFound => 3,
            Self::SyntaxError => 3,
            Self::ValidationError => 3,
            Self::Conflict => 2,
            Self::Unknown => 2,
            Self::PermissionDenied => 1,
        }
    }
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured tool failure: kind plus message, context, and recovery hints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
    pub recoverable: bool,
    #[serde(default)]
    pub suggested_recovery: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_error: Option<String>,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
            recoverable: kind.recoverable_by_agent(),
            suggested_recovery: suggested_recovery(kind),
            original_error: None,
        }
    }

    pub fn with_context(mut self, key: &str, value: Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    pub fn with_original(mut self, original: impl Into<String>) -> Self {
        self.original_error = Some(original.into());
        self
    }

    /// Classify a raw failure from a tool named `tool` into the taxonomy.
    ///
    /// `details` are extra (key, value) pairs checked after the message.
    pub fn classify(tool: &str, message: &str, details: &[(&str, &str)]) -> Self {
        let kind = classify_text(message).unwrap_or_else(|| {
            details
                .iter()
                .find_map(|(_, v)| classify_text(v))
                .unwrap_or(ToolErrorKind::Unknown)
        });
        let mut err = Self::new(kind, format!("{tool}: {message}"));
        err.context.insert("tool".into(), Value::String(tool.to_string()));
        err.original_error = Some(message.to_string());
        err
    }

    /// Serialize into the wire shape the dispatcher returns to callers.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "error": self.message,
            "error_type": self.kind.as_str(),
            "recoverable": self.recoverable,
            "suggested_recovery": self.suggested_recovery,
            "context": self.context,
            "original_error": self.original_error,
        })
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ToolError {}

/// Classification rules in priority order; case-insensitive.
fn classify_text(text: &str) -> Option<ToolErrorKind> {
    let t = text.to_lowercase();

    let contains_any = |needles: &[&str]| needles.iter().any(|n| t.contains(n));

    if contains_any(&["no such file", "file not found", "enoent", "cannot find module", "module not found"]) {
        return Some(ToolErrorKind::NotFound);
    }
    if contains_any(&[
        "permission denied",
        "access denied",
        "eacces",
        "eperm",
        "forbidden",
        "unauthorized",
    ]) {
        return Some(ToolErrorKind::PermissionDenied);
    }
    if contains_any(&["timed out", "timeout", "deadline exceeded"]) {
        return Some(ToolErrorKind::Timeout);
    }
    if contains_any(&[
        "connection refused",
        "connection reset",
        "econnrefused",
        "econnreset",
        "dns error",
        "host unreachable",
        "network error",
    ]) {
        return Some(ToolErrorKind::Network);
    }
    if contains_any(&["syntax error", "unexpected token", "invalid syntax", "parse error"]) {
        return Some(ToolErrorKind::SyntaxError);
    }
    // 404 referring to a route is a routing bug, not a missing file.
    if t.contains("404") {
        if t.contains("route") || t.contains("endpoint") {
            return Some(ToolErrorKind::SyntaxError);
        }
        return Some(ToolErrorKind::NotFound);
    }
    if contains_any(&["already exists", "duplicate key", "unique constraint", "eexist"]) {
        return Some(ToolErrorKind::Conflict);
    }
    if contains_any(&["invalid argument", "typeerror", "valueerror", "invalid parameter"]) {
        return Some(ToolErrorKind::ValidationError);
    }
    if contains_any(&[
        "service unavailable",
        "503",
        "429",
        "rate limit",
        "database is locked",
        "deadlock",
    ]) {
        return Some(ToolErrorKind::Transient);
    }
    None
}

fn suggested_recovery(kind: ToolErrorKind) -> Vec<String> {
    let steps: &[&str] = match kind {
        ToolErrorKind::NotFound => &[
            "Use search_code or list_dir to locate the missing file",
            "Check if the file path is relative to the workspace root",
        ],
        ToolErrorKind::PermissionDenied => &[
            "Check workspace permissions for the target path",
            "Verify the file or directory is not in use",
        ],
        ToolErrorKind::SyntaxError => &[
            "Review the generated code for syntax issues",
            "Run a linter to pinpoint the error location",
        ],
        ToolErrorKind::ValidationError => &[
            "Verify the tool arguments match the expected schema",
            "Ensure all required fields are provided",
        ],
        ToolErrorKind::Timeout => &[
            "Break the operation into smaller steps",
            "Check whether the command is waiting for input",
        ],
        ToolErrorKind::Network => &[
            "Check connectivity and retry after a short delay",
        ],
        ToolErrorKind::Conflict => &[
            "The resource already exists or has conflicting changes",
            "Review the current state before proceeding",
        ],
        ToolErrorKind::Transient => &["Retry the operation after a short delay"],
        ToolErrorKind::Unknown => &[],
    };
    steps.iter().map(|s| s.to_string()).collect()
}
