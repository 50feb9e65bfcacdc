use std::sync::LazyLock;

use regex::Regex;

use rev_core::action::ActionKind;
use rev_core::task::Task;

/// Word-boundary based intent detection. Boundaries matter: "analy"
/// must not match inside "analysts".
static READ_INTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(read|inspect|review|analyze|analysis|understand|locate|find|search|inventory|identify|list|show|explain)\b",
    )
    .unwrap()
});

static WRITE_INTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(edit|update|modify|change|refactor|remove|delete|rename|create|add|write|generate|apply)\b|split_python_module_classes|replace_in_file|write_file|apply_patch|append_to_file|create_directory",
    )
    .unwrap()
});

static INSTALL_COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(npm|pip|pip3|yum|apt-get|apt|choco|brew)\s+install\b").unwrap()
});

/// Outcome of the action-semantics check.
#[derive(Debug, Clone)]
pub struct SemanticsCheck {
    pub ok: bool,
    pub messages: Vec<String>,
}

/// Coerce overloaded actions into read-only vs mutating, or fail so the
/// planner retries.
///
/// - mutating action + inspection-only description: coerce to `read`
/// - read-only action + write intent: fail fast (replan)
/// - package-manager install commands: coerce to `test` (they belong to
///   the execution-runner agent)
pub fn check_action_semantics(task: &mut Task) -> SemanticsCheck {
    let action = task.action;
    let desc = task.description.trim().to_string();
    if desc.is_empty() {
        return SemanticsCheck {
            ok: true,
            messages: Vec::new(),
        };
    }

    let mut messages = Vec::new();

    if INSTALL_COMMAND.is_match(&desc) && !matches!(task.action, ActionKind::Test) {
        messages.push(format!(
            "coerced action '{action}' -> 'test' (package install command)"
        ));
        task.action = ActionKind::Test;
        return SemanticsCheck { ok: true, messages };
    }

    let read_intent = READ_INTENT.is_match(&desc);
    let write_intent = WRITE_INTENT.is_match(&desc);

    if action.is_mutating() && read_intent && !write_intent {
        task.action = ActionKind::Read;
        messages.push(format!("coerced action '{action}' -> 'read' (inspection-only task)"));
        return SemanticsCheck { ok: true, messages };
    }

    if action.is_read_only() && write_intent && !read_intent {
        messages.push(format!(
            "action '{action}' conflicts with write intent; choose edit/refactor instead"
        ));
        return SemanticsCheck { ok: false, messages };
    }

    SemanticsCheck { ok: true, messages }
}
