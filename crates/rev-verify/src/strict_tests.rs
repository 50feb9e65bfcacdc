use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use rev_config::RepoConfig;
use rev_core::action::ActionKind;
use rev_core::context::ExecutionContext;
use rev_core::error::ToolError;
use rev_core::task::{Task, ValidationStep};
use rev_tools::registry::{Tool, ToolRegistry};
use rev_tools::Dispatcher;
use rev_workspace::Workspace;

use super::*;

type Responder = Box<dyn Fn(&str) -> Value + Send + Sync>;

/// Fake process runner: maps commands to canned results and logs calls.
struct ScriptedRunner {
    tool_name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    respond: Responder,
}

#[async_trait]
impl Tool for ScriptedRunner {
    fn name(&self) -> &str {
        self.tool_name
    }

    fn description(&self) -> &str {
        "scripted runner"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"cmd": {"type": "string"}}, "required": ["cmd"]})
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let cmd = args["cmd"].as_str().unwrap_or("").to_string();
        self.log.lock().unwrap().push(cmd.clone());
        Ok((self.respond)(&cmd))
    }
}

struct Fixture {
    dispatcher: Dispatcher,
    ctx: ExecutionContext,
    log: Arc<Mutex<Vec<String>>>,
    root: PathBuf,
}

fn fixture(respond: Responder) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    std::mem::forget(dir);

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ToolRegistry::new();
    registry.register(ScriptedRunner {
        tool_name: "run_cmd",
        log: log.clone(),
        respond,
    });

    Fixture {
        dispatcher: Dispatcher::new(Arc::new(registry), Workspace::new(root.clone())),
        ctx: ExecutionContext::new("req", root.clone()),
        log,
        root,
    }
}

fn ok_all() -> Responder {
    Box::new(|_| json!({"rc": 0, "stdout": "ok", "stderr": ""}))
}

fn config(mode: StrictMode, repo: &RepoConfig) -> StrictConfig<'_> {
    StrictConfig {
        mode,
        timeout_secs: 30,
        repo,
        allow_auto_install: true,
    }
}

fn commands(fx: &Fixture) -> Vec<String> {
    fx.log.lock().unwrap().clone()
}

#[tokio::test]
async fn test_validation_steps_pass_and_fail() {
    let mut fx = fixture(Box::new(|cmd| {
        if cmd.contains("ruff") {
            json!({"rc": 1, "stdout": "", "stderr": "E999 syntax error"})
        } else {
            json!({"rc": 0, "stdout": "", "stderr": ""})
        }
    }));
    let mut task = Task::new(ActionKind::Edit, "edit lib/a.py");
    task.validation_steps = vec![
        ValidationStep { label: "pytest".into(), command: "pytest -q tests".into() },
        ValidationStep { label: "ruff".into(), command: "ruff check lib/a.py".into() },
    ];

    let err = run_validation_steps(&task, &fx.dispatcher, &mut fx.ctx, 30)
        .await
        .unwrap_err();
    assert!(!err.passed);
    assert!(err.message.contains("ruff check"));
    assert!(err.details.contains_key("validation"));

    task.validation_steps.pop();
    let details = run_validation_steps(&task, &fx.dispatcher, &mut fx.ctx, 30)
        .await
        .unwrap();
    assert!(details.contains_key("pytest"));
}

#[tokio::test]
async fn test_python_smoke_runs_compileall_only() {
    let mut fx = fixture(ok_all());
    std::fs::create_dir_all(fx.root.join("lib")).unwrap();
    std::fs::write(fx.root.join("lib/a.py"), "x = 1\n").unwrap();
    std::fs::write(fx.root.join("pyproject.toml"), "[project]\nname='x'\n").unwrap();

    let repo = RepoConfig::default();
    let task = Task::new(ActionKind::Edit, "edit lib/a.py");
    let paths = vec![fx.root.join("lib/a.py")];
    let details = run_strict_matrix(&task, &paths, &config(StrictMode::Smoke, &repo), &fx.dispatcher, &mut fx.ctx)
        .await
        .unwrap();

    assert!(details.contains_key("compileall"));
    let cmds = commands(&fx);
    assert_eq!(cmds.len(), 1);
    assert!(cmds[0].starts_with("python -m compileall"));
}

#[tokio::test]
async fn test_python_targeted_runs_pytest_on_touched_tests() {
    let mut fx = fixture(ok_all());
    std::fs::create_dir_all(fx.root.join("tests")).unwrap();
    std::fs::write(fx.root.join("tests/test_a.py"), "def test(): pass\n").unwrap();
    std::fs::write(fx.root.join("pyproject.toml"), "[project]\n").unwrap();

    let repo = RepoConfig::default();
    let task = Task::new(ActionKind::Edit, "edit tests/test_a.py");
    let paths = vec![fx.root.join("tests/test_a.py")];
    run_strict_matrix(&task, &paths, &config(StrictMode::Targeted, &repo), &fx.dispatcher, &mut fx.ctx)
        .await
        .unwrap();

    let cmds = commands(&fx);
    assert!(cmds.iter().any(|c| c.starts_with("pytest -q") && c.contains("test_a.py")));
}

#[tokio::test]
async fn test_pytest_rc5_is_inconclusive_unless_expected() {
    let respond: Responder = Box::new(|cmd| {
        if cmd.starts_with("pytest") {
            json!({"rc": 5, "stdout": "collected 0 items", "stderr": ""})
        } else {
            json!({"rc": 0, "stdout": "", "stderr": ""})
        }
    });
    let mut fx = fixture(respond);
    std::fs::write(fx.root.join("pyproject.toml"), "[project]\n").unwrap();
    std::fs::write(fx.root.join("a.py"), "x = 1\n").unwrap();

    let repo = RepoConfig::default();
    let task = Task::new(ActionKind::Edit, "edit a.py");
    let paths = vec![fx.root.join("a.py")];
    let err = run_strict_matrix(&task, &paths, &config(StrictMode::Targeted, &repo), &fx.dispatcher, &mut fx.ctx)
        .await
        .unwrap_err();
    assert!(err.inconclusive);
    assert!(err.should_replan);

    // Same run with the phrase present passes.
    let respond: Responder = Box::new(|cmd| {
        if cmd.starts_with("pytest") {
            json!({"rc": 5, "stdout": "collected 0 items", "stderr": ""})
        } else {
            json!({"rc": 0, "stdout": "", "stderr": ""})
        }
    });
    let mut fx = fixture(respond);
    std::fs::write(fx.root.join("pyproject.toml"), "[project]\n").unwrap();
    std::fs::write(fx.root.join("a.py"), "x = 1\n").unwrap();
    let task = Task::new(ActionKind::Edit, "edit a.py, no tests expected here");
    let paths = vec![fx.root.join("a.py")];
    let details = run_strict_matrix(&task, &paths, &config(StrictMode::Targeted, &repo), &fx.dispatcher, &mut fx.ctx)
        .await
        .unwrap();
    assert!(details.contains_key("pytest_note"));
}

#[tokio::test]
async fn test_custom_repo_test_command_wins() {
    let mut fx = fixture(ok_all());
    std::fs::write(fx.root.join("pyproject.toml"), "[project]\n").unwrap();
    std::fs::write(fx.root.join("a.py"), "").unwrap();

    let repo: RepoConfig = toml::from_str("[backend]\ntest = \"pytest -q tests/unit\"\n").unwrap();
    let task = Task::new(ActionKind::Edit, "edit a.py");
    let paths = vec![fx.root.join("a.py")];
    run_strict_matrix(&task, &paths, &config(StrictMode::Targeted, &repo), &fx.dispatcher, &mut fx.ctx)
        .await
        .unwrap();
    assert!(commands(&fx).iter().any(|c| c == "pytest -q tests/unit"));
}

#[tokio::test]
async fn test_node_no_tests_found_rewrites_once() {
    let calls = Arc::new(Mutex::new(0u32));
    let calls_clone = calls.clone();
    let respond: Responder = Box::new(move |cmd| {
        if cmd.contains("jest") {
            let mut n = calls_clone.lock().unwrap();
            *n += 1;
            if *n == 1 {
                json!({"rc": 1, "stdout": "No tests found, exiting with code 1", "stderr": ""})
            } else {
                json!({"rc": 0, "stdout": "1 passed", "stderr": ""})
            }
        } else {
            json!({"rc": 0, "stdout": "", "stderr": ""})
        }
    });
    let mut fx = fixture(respond);
    std::fs::write(fx.root.join("package.json"), "{}").unwrap();
    std::fs::create_dir_all(fx.root.join("tests")).unwrap();
    std::fs::write(fx.root.join("tests/user.test.ts"), "").unwrap();

    let repo: RepoConfig =
        toml::from_str("[frontend]\ntest = \"npx jest tests/user.test.ts\"\n").unwrap();
    let task = Task::new(ActionKind::Edit, "edit tests/user.test.ts");
    let paths = vec![fx.root.join("tests/user.test.ts")];
    let details = run_strict_matrix(&task, &paths, &config(StrictMode::Targeted, &repo), &fx.dispatcher, &mut fx.ctx)
        .await
        .unwrap();

    assert!(details.contains_key("npm_test_first"));
    let cmds = commands(&fx);
    assert!(cmds.iter().any(|c| c.contains("--runTestsByPath")));
}

#[tokio::test]
async fn test_node_watch_mode_timeout_diagnosed() {
    let respond: Responder = Box::new(|cmd| {
        if cmd.contains("npm test") {
            json!({"rc": -1, "stdout": "Watch Usage\n press q to quit", "stderr": "", "timeout": true})
        } else {
            json!({"rc": 0, "stdout": "", "stderr": ""})
        }
    });
    let mut fx = fixture(respond);
    std::fs::write(fx.root.join("package.json"), "{}").unwrap();
    std::fs::write(fx.root.join("app.ts"), "").unwrap();

    let repo = RepoConfig::default();
    let task = Task::new(ActionKind::Edit, "edit app.ts");
    let paths = vec![fx.root.join("app.ts")];
    let err = run_strict_matrix(&task, &paths, &config(StrictMode::Targeted, &repo), &fx.dispatcher, &mut fx.ctx)
        .await
        .unwrap_err();
    assert!(err.details.contains_key("timeout_diagnosis"));
    assert_eq!(err.details["timeout_diagnosis"]["kind"], "watch_mode_timeout");
}

#[tokio::test]
async fn test_missing_pytest_triggers_install_and_retry() {
    let calls = Arc::new(Mutex::new(0u32));
    let calls_clone = calls.clone();
    let respond: Responder = Box::new(move |cmd| {
        if cmd.starts_with("pytest") {
            let mut n = calls_clone.lock().unwrap();
            *n += 1;
            if *n == 1 {
                json!({"rc": 127, "stdout": "", "stderr": "pytest: command not found"})
            } else {
                json!({"rc": 0, "stdout": "2 passed", "stderr": ""})
            }
        } else {
            json!({"rc": 0, "stdout": "", "stderr": ""})
        }
    });
    let mut fx = fixture(respond);
    std::fs::write(fx.root.join("requirements.txt"), "requests\n").unwrap();
    std::fs::write(fx.root.join("a.py"), "").unwrap();

    let repo = RepoConfig::default();
    let task = Task::new(ActionKind::Edit, "edit a.py");
    let paths = vec![fx.root.join("a.py")];
    run_strict_matrix(&task, &paths, &config(StrictMode::Targeted, &repo), &fx.dispatcher, &mut fx.ctx)
        .await
        .unwrap();

    let cmds = commands(&fx);
    assert!(cmds.iter().any(|c| c == "pip install pytest"));
    assert_eq!(cmds.iter().filter(|c| c.starts_with("pytest")).count(), 2);
}

#[tokio::test]
async fn test_no_runner_registered_skips_strict() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    std::fs::write(root.join("a.py"), "").unwrap();
    let dispatcher = Dispatcher::new(Arc::new(ToolRegistry::new()), Workspace::new(root.clone()));
    let mut ctx = ExecutionContext::new("r", root.clone());

    let repo = RepoConfig::default();
    let task = Task::new(ActionKind::Edit, "edit a.py");
    let details = run_strict_matrix(
        &task,
        &[root.join("a.py")],
        &config(StrictMode::Full, &repo),
        &dispatcher,
        &mut ctx,
    )
    .await
    .unwrap();
    assert!(details.is_empty());
}

#[tokio::test]
async fn test_no_tests_expected_phrase() {
    let task = Task::new(ActionKind::Test, "run tests, no tests expected yet");
    assert!(no_tests_expected(&task));
    let task = Task::new(ActionKind::Test, "run tests");
    assert!(!no_tests_expected(&task));
}
