use std::sync::LazyLock;

use regex::Regex;

use rev_core::action::ActionKind;
use rev_core::task::{Task, ValidationStep};

static VALIDATION_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)\bvalidation:\s*(.+?)\s*$").unwrap());

/// Parse inline hints like "Validation: pytest -q tests/" out of a task
/// description into typed validation steps. Tasks whose action is already
/// `test` are left alone (the task itself is the validation).
pub fn extract_validation_steps(task: &mut Task) {
    if task.action == ActionKind::Test {
        return;
    }
    let description = task.description.clone();
    let Some(caps) = VALIDATION_HINT.captures(&description) else {
        return;
    };

    let commands = caps[1]
        .split(';')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|command| ValidationStep {
            label: label_for(command),
            command: command.to_string(),
        })
        .collect::<Vec<_>>();
    if commands.is_empty() {
        return;
    }

    for step in commands {
        if !task.validation_steps.iter().any(|s| s.command == step.command) {
            task.validation_steps.push(step);
        }
    }

    // Strip the hint from the description so later path preflight does
    // not chase command tokens.
    let stripped = VALIDATION_HINT.replace_all(&description, "").trim().to_string();
    if !stripped.is_empty() {
        task.description = stripped;
    }
}

fn label_for(command: &str) -> String {
    command
        .split_whitespace()
        .next()
        .unwrap_or("cmd")
        .rsplit('/')
        .next()
        .unwrap_or("cmd")
        .to_string()
}
