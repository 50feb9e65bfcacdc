use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use rev_core::action::ActionKind;
use rev_core::context::ExecutionContext;
use rev_core::task::{Task, ToolEvent};
use rev_tools::registry::ToolRegistry;
use rev_tools::Dispatcher;
use rev_workspace::Workspace;

use super::*;

fn fixture() -> (Workspace, ExecutionContext, Dispatcher, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    std::mem::forget(dir);
    (
        Workspace::new(root.clone()),
        ExecutionContext::new("split the classes", root.clone()),
        // No run_cmd registered: the smoke import is skipped silently.
        Dispatcher::new(Arc::new(ToolRegistry::new()), Workspace::new(root.clone())),
        root,
    )
}

fn split_task(root: &PathBuf) -> Task {
    let mut task = Task::new(
        ActionKind::Refactor,
        "split the classes out of lib/analysts.py into a package",
    );
    task.record_tool_event(
        ToolEvent::new(
            "split_python_module_classes",
            json!({"path": "lib/analysts.py", "target_directory": "lib/analysts"}),
        )
        .with_result(json!({"classes_split": 3, "package_dir": "lib/analysts"}).to_string()),
    );
    task.result = Some(
        json!({
            "tool_name": "split_python_module_classes",
            "tool_output": "{\"classes_split\": 3, \"package_dir\": \"lib/analysts\"}"
        })
        .to_string(),
    );
    let _ = root;
    task
}

fn make_package(root: &PathBuf, with_all: bool) {
    fs::create_dir_all(root.join("lib/analysts")).unwrap();
    fs::write(root.join("lib/analysts/a.py"), "class A:\n    pass\n").unwrap();
    fs::write(root.join("lib/analysts/b.py"), "from .a import A\n\nclass B(A):\n    pass\n").unwrap();
    fs::write(root.join("lib/analysts/c.py"), "class C:\n    pass\n").unwrap();
    let init = if with_all {
        "from .a import A\nfrom .b import B\nfrom .c import C\n\n__all__ = [\"A\", \"a\", \"b\", \"c\", \"B\", \"C\"]\n"
    } else {
        "from .a import A\nfrom .b import B\nfrom .c import C\n"
    };
    fs::write(root.join("lib/analysts/__init__.py"), init).unwrap();
}

#[tokio::test]
async fn test_happy_path_extraction() {
    let (ws, mut ctx, dispatcher, root) = fixture();
    make_package(&root, true);
    let task = split_task(&root);

    let vr = verify_refactoring(&task, &mut ctx, &ws, &dispatcher).await;
    assert!(vr.passed, "{}", vr.message);
    assert_eq!(vr.detail_str("dir_path"), Some("lib/analysts"));
}

#[tokio::test]
async fn test_extraction_with_no_files_fails() {
    let (ws, mut ctx, dispatcher, root) = fixture();
    fs::create_dir_all(root.join("lib/analysts")).unwrap();
    let task = split_task(&root);

    let vr = verify_refactoring(&task, &mut ctx, &ws, &dispatcher).await;
    assert!(!vr.passed);
    assert!(vr.message.contains("extracted NO FILES"));
    assert!(vr.should_replan);
}

#[tokio::test]
async fn test_no_writing_tool_fails() {
    let (ws, mut ctx, dispatcher, root) = fixture();
    make_package(&root, true);
    let mut task = Task::new(ActionKind::Refactor, "split lib/analysts.py");
    task.record_tool_event(ToolEvent::new("read_file", json!({"path": "lib/analysts.py"})));

    let vr = verify_refactoring(&task, &mut ctx, &ws, &dispatcher).await;
    assert!(!vr.passed);
    assert!(vr.message.contains("no writing tool call"));
}

#[tokio::test]
async fn test_missing_target_directory_fails() {
    let (ws, mut ctx, dispatcher, root) = fixture();
    let task = split_task(&root);
    let vr = verify_refactoring(&task, &mut ctx, &ws, &dispatcher).await;
    assert!(!vr.passed);
    assert!(vr.message.contains("does not exist"));
}

#[tokio::test]
async fn test_broken_relative_import_fails() {
    let (ws, mut ctx, dispatcher, root) = fixture();
    make_package(&root, true);
    fs::write(
        root.join("lib/analysts/b.py"),
        "from .missing_module import X\n\nclass B:\n    pass\n",
    )
    .unwrap();
    let task = split_task(&root);

    let vr = verify_refactoring(&task, &mut ctx, &ws, &dispatcher).await;
    assert!(!vr.passed);
    assert!(vr.message.contains("missing_module"));
}

#[tokio::test]
async fn test_init_without_all_is_warning_not_failure() {
    let (ws, mut ctx, dispatcher, root) = fixture();
    make_package(&root, false);
    let task = split_task(&root);

    let vr = verify_refactoring(&task, &mut ctx, &ws, &dispatcher).await;
    assert!(vr.passed);
    let warnings = vr.details.get("warnings").unwrap().as_array().unwrap();
    assert!(warnings.iter().any(|w| w.as_str().unwrap().contains("no __all__")));
}

#[tokio::test]
async fn test_surviving_source_file_fails() {
    let (ws, mut ctx, dispatcher, root) = fixture();
    make_package(&root, true);
    fs::write(root.join("lib/analysts.py"), "class A: pass\n").unwrap();
    let task = split_task(&root);

    let vr = verify_refactoring(&task, &mut ctx, &ws, &dispatcher).await;
    assert!(!vr.passed);
    assert!(vr.message.contains("Source file still exists"));
}

#[tokio::test]
async fn test_surviving_source_with_marker_is_warning() {
    let (ws, mut ctx, dispatcher, root) = fixture();
    make_package(&root, true);
    fs::write(root.join("lib/analysts.py"), "class A: pass\n").unwrap();
    let mut task = split_task(&root);
    task.result = Some(
        json!({
            "tool_name": "split_python_module_classes",
            "tool_output": "{\"classes_split\": 3, \"note\": \"source left for LLM to handle\"}"
        })
        .to_string(),
    );

    let vr = verify_refactoring(&task, &mut ctx, &ws, &dispatcher).await;
    assert!(vr.passed, "{}", vr.message);
    assert!(vr.details.contains_key("warnings"));
}
