use serde_json::{json, Value};

use rev_core::context::ExecutionContext;
use rev_tools::Dispatcher;

/// Parsed outcome of one validation command run through the tool layer.
#[derive(Debug, Clone, Default)]
pub struct CommandOutcome {
    pub cmd: String,
    pub rc: Option<i64>,
    pub stdout: String,
    pub stderr: String,
    pub blocked: bool,
    pub timeout: bool,
}

impl CommandOutcome {
    pub fn failed(&self) -> bool {
        self.blocked || self.timeout || self.rc.unwrap_or(1) != 0
    }

    pub fn error_excerpt(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let mut lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let tail = lines.split_off(lines.len().saturating_sub(5));
        if tail.is_empty() {
            "Unknown error".to_string()
        } else {
            tail.join("\n")
        }
    }

    pub fn combined_output(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }

    pub fn to_detail(&self) -> Value {
        json!({
            "cmd": self.cmd,
            "rc": self.rc,
            "stdout": truncate(&self.stdout, 2000),
            "stderr": truncate(&self.stderr, 2000),
            "blocked": self.blocked,
            "timeout": self.timeout,
        })
    }
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_string();
    }
    let mut cut = limit;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &s[..cut])
}

/// Run a shell command through the registered `run_cmd`/`run_tests` tool.
///
/// Returns None when no runner tool is registered (library tests and
/// exploration mode run without a process runner).
pub async fn run_validation_command(
    dispatcher: &Dispatcher,
    ctx: &mut ExecutionContext,
    cmd: &str,
    use_tests_tool: bool,
    timeout_secs: u64,
) -> Option<CommandOutcome> {
    let tool = if use_tests_tool && dispatcher.registry().contains("run_tests") {
        "run_tests"
    } else if dispatcher.registry().contains("run_cmd") {
        "run_cmd"
    } else {
        return None;
    };

    let raw = dispatcher
        .execute(
            tool,
            json!({"cmd": cmd, "timeout": timeout_secs}),
            ctx,
            None,
        )
        .await;
    Some(parse_command_result(cmd, &raw))
}

/// Parse the tool-layer JSON for a command run. Missing keys degrade to
/// a failed outcome rather than a crash.
pub fn parse_command_result(cmd: &str, raw: &str) -> CommandOutcome {
    let mut outcome = CommandOutcome {
        cmd: cmd.to_string(),
        ..Default::default()
    };
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        outcome.stderr = raw.to_string();
        return outcome;
    };
    let Some(obj) = value.as_object() else {
        outcome.stderr = raw.to_string();
        return outcome;
    };

    if obj.contains_key("error") {
        outcome.stderr = obj
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("tool error")
            .to_string();
        return outcome;
    }

    outcome.rc = obj.get("rc").and_then(Value::as_i64);
    outcome.stdout = obj
        .get("stdout")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    outcome.stderr = obj
        .get("stderr")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    outcome.blocked = match obj.get("blocked") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::String(s)) => !s.is_empty(),
        _ => false,
    };
    outcome.timeout = obj.get("timeout").and_then(Value::as_bool).unwrap_or(false)
        || outcome.rc == Some(-1);
    outcome
}

/// Test framework inferred command-first, output-second: an explicit
/// runner in the command wins regardless of what the output looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestFramework {
    Vitest,
    Jest,
    PytestLike,
    Unittest,
    Unknown,
}

pub fn detect_framework(cmd: &str, output: &str) -> TestFramework {
    let cmd_lower = cmd.to_lowercase();
    if cmd_lower.contains("vitest") {
        return TestFramework::Vitest;
    }
    if cmd_lower.contains("jest") {
        return TestFramework::Jest;
    }
    if cmd_lower.contains("python -m unittest") || cmd_lower.contains("unittest") {
        return TestFramework::Unittest;
    }
    if cmd_lower.contains("pytest") {
        return TestFramework::PytestLike;
    }

    // Generic command (npm test, node runner.js): fall back to output.
    let out_lower = output.to_lowercase();
    if out_lower.contains("vitest") {
        return TestFramework::Vitest;
    }
    if out_lower.contains("jest") || out_lower.contains("watch usage") {
        return TestFramework::Jest;
    }
    if out_lower.contains("pytest") {
        return TestFramework::PytestLike;
    }
    TestFramework::Unknown
}

/// When a runner reports "no tests found" once, rewrite the command
/// conservatively for a single retry.
pub fn rewrite_no_tests_command(cmd: &str, output: &str) -> Option<String> {
    match detect_framework(cmd, output) {
        TestFramework::Jest => {
            if cmd.contains("--runTestsByPath") {
                None
            } else {
                Some(format!("{cmd} --runTestsByPath"))
            }
        }
        TestFramework::Vitest => {
            // Keep --run, prune jest-only flags.
            let pruned: Vec<&str> = cmd
                .split_whitespace()
                .filter(|w| !matches!(*w, "--runTestsByPath" | "--watchAll=false" | "--watchAll"))
                .collect();
            let mut rewritten = pruned.join(" ");
            if !rewritten.contains("--run") {
                rewritten.push_str(" --run");
            }
            (rewritten != cmd).then_some(rewritten)
        }
        TestFramework::Unittest => {
            // Convert path/to/file.py into the dotted module path.
            let rewritten = cmd
                .split_whitespace()
                .map(|w| {
                    if w.ends_with(".py") && w.contains('/') {
                        w.trim_end_matches(".py").replace('/', ".")
                    } else {
                        w.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            (rewritten != cmd).then_some(rewritten)
        }
        _ => None,
    }
}
