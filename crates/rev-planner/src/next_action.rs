use rev_core::action::ActionKind;
use rev_core::task::Task;
use rev_llm::{ChatClient, ChatMessage};

use crate::parse::{order_available_actions, parse_action_line};
use crate::PlannerError;

/// Inputs for one next-action planning round.
#[derive(Debug, Clone, Default)]
pub struct NextActionInput {
    pub user_request: String,
    /// Recent work-history lines, oldest first.
    pub work_summary: Vec<String>,
    /// Pending agent requests, already rendered as WARNING lines.
    pub warnings: Vec<String>,
    /// Set when the last test run was skipped because nothing changed
    /// since a failing run.
    pub tests_blocked: bool,
    pub last_test_rc: Option<i64>,
}

/// Lightweight continuous planner: one chat call per iteration, one
/// action out.
pub struct NextActionPlanner<'a> {
    chat: &'a dyn ChatClient,
    available_actions: Vec<ActionKind>,
}

impl<'a> NextActionPlanner<'a> {
    pub fn new(chat: &'a dyn ChatClient, available_actions: &[ActionKind]) -> Self {
        Self {
            chat,
            available_actions: order_available_actions(available_actions),
        }
    }

    /// Ask for the single next action. `Ok(None)` means the goal is
    /// achieved (subject to the loop's grounding check).
    pub async fn next_action(&self, input: &NextActionInput) -> Result<Option<Task>, PlannerError> {
        let prompt = self.build_prompt(input);
        let reply = self.chat.chat(&[ChatMessage::user(prompt)], None).await?;
        Ok(parse_action_line(&reply.content))
    }

    fn build_prompt(&self, input: &NextActionInput) -> String {
        let work_summary = if input.work_summary.is_empty() {
            "No actions taken yet.".to_string()
        } else {
            let lines: Vec<String> = input
                .work_summary
                .iter()
                .map(|l| format!("- {l}"))
                .collect();
            format!("Work Completed So Far:\n{}", lines.join("\n"))
        };

        let mut notes = String::new();
        for warning in &input.warnings {
            notes.push_str(warning);
            notes.push('\n');
        }
        if input.tests_blocked && input.last_test_rc.is_some_and(|rc| rc != 0) {
            notes.push_str(
                "Important: The last [TEST] was skipped because no code changed since the last \
                 failing test run.\nDo NOT propose another [TEST] until a code-changing step \
                 (e.g. [EDIT]/[REFACTOR]) is completed.\n",
            );
        }
        if !notes.is_empty() {
            notes.push('\n');
        }

        let actions: Vec<&str> = self.available_actions.iter().map(|a| a.as_str()).collect();

        format!(
            "Original Request: {request}\n\n\
             {work_summary}\n\n\
             {notes}\
             Based on the work completed, what is the single next most important action to take? \
             If a previous action failed, propose a different action to achieve the goal.\n\
             \n\
             ACTION SEMANTICS (critical):\n\
             - Use [READ] or [ANALYZE] when the next step is inspection only (open files, search, \
             inventory imports, understand structure).\n\
             - Use [EDIT]/[ADD]/[CREATE_DIRECTORY]/[REFACTOR] only when you will perform a \
             repo-changing tool call in this step.\n\
             - If unsure whether a path exists, choose [READ] first to locate the correct file path(s).\n\
             \n\
             Constraints to avoid duplicating work:\n\
             - Do not propose repeating a step that is already complete (e.g., do not re-create a \
             directory that exists).\n\
             - If you are going to use `split_python_module_classes`, do not hand-author the package \
             `__init__.py` first; let the tool generate it.\n\
             - After `split_python_module_classes` runs, the source file is renamed to `*.py.bak`. \
             Do not try to edit the old `*.py` path.\n\
             - If the code was split into a package with __init__.py exports, prefer package-export \
             imports at call sites.\n\
             - Avoid replacing `from pkg import *` with dozens of per-module imports; only import \
             names actually used.\n\
             You MUST choose one of the following action types: {actions:?}\n\
             Your response should be a single line in the format: [ACTION_TYPE] description of the action.\n\
             Example: [EDIT] refactor the authentication middleware to use the new session manager.\n\
             If the goal has been achieved, respond with only the text 'GOAL_ACHIEVED'.",
            request = input.user_request,
        )
    }
}
