use std::sync::LazyLock;

use regex::Regex;

use rev_core::action::ActionKind;
use rev_core::context::ExecutionContext;
use rev_core::goal::derive_goals;
use rev_core::plan::ExecutionPlan;
use rev_core::task::Task;
use rev_llm::{ChatClient, ChatMessage, ToolSchema};
use rev_tools::Dispatcher;

use crate::parse::parse_task_array;
use crate::validation::extract_validation_steps;
use crate::PlannerError;

const PLANNING_SYSTEM: &str = "You are an expert coding agent analyzing a request and creating an \
execution plan for a repository. Reply with a JSON array of tasks. Each task is an object with \
\"action\" (one of: read, analyze, review, research, investigate, edit, add, create, \
create_directory, refactor, delete, rename, fix, test, doc), \"description\" (a concrete, \
actionable step naming real file paths), and optional \"complexity\" (low|medium|high). \
You may call the provided read-only tools to inspect the repository before planning. \
Inline validation hints like 'Validation: pytest -q tests/' are encouraged on mutating tasks.";

const STRICT_SUFFIX: &str = "Your previous reply could not be parsed. Reply with ONLY a JSON array \
of task objects, no prose, no markdown fences.";

const BREAKDOWN_SYSTEM: &str = "You are an expert at breaking down complex coding tasks into \
smaller actionable subtasks. Given one broad task, reply with a JSON array of 5 to 15 atomic \
subtasks, each an object with \"action\" and \"description\". Subtasks must be concrete enough to \
execute with a single tool call each, and must name real file paths where possible.";

/// Cap on tool output fed back into the planning conversation.
const TOOL_RESULT_CHAR_LIMIT: usize = 6000;

static BROAD_TASK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(entire|whole|all files|everything|every module|complete overhaul|across the codebase)\b")
        .unwrap()
});

static PATH_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9_./-]+\.(?:py|js|jsx|ts|tsx|vue|go|rs|rb|java|json|toml|yaml|yml|md)\b|[A-Za-z0-9_.-]+/[A-Za-z0-9_./-]+")
        .unwrap()
});

static TOOL_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\busing\s+[a-z_]+\b|\b[a-z_]+\(").unwrap());

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub max_plan_tasks: usize,
    /// Read-only tool rounds allowed during planning.
    pub max_planning_iterations: u32,
    pub parse_retries: u32,
    pub coding_mode: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_plan_tasks: 12,
            max_planning_iterations: 6,
            parse_retries: 2,
            coding_mode: true,
        }
    }
}

/// Batch planner: one request in, an ordered, post-processed plan out.
pub struct BatchPlanner<'a> {
    chat: &'a dyn ChatClient,
    config: PlannerConfig,
}

impl<'a> BatchPlanner<'a> {
    pub fn new(chat: &'a dyn ChatClient, config: PlannerConfig) -> Self {
        Self { chat, config }
    }

    /// Produce a plan. When a dispatcher is supplied, the planner may run
    /// read-only tools for a bounded number of rounds before committing.
    pub async fn plan(
        &self,
        user_request: &str,
        repo_context: &str,
        dispatcher: Option<&Dispatcher>,
        ctx: &mut ExecutionContext,
    ) -> Result<ExecutionPlan, PlannerError> {
        let tool_schemas = dispatcher.map(read_only_schemas).unwrap_or_default();
        let tools = (!tool_schemas.is_empty()).then_some(tool_schemas.as_slice());

        let mut messages = vec![
            ChatMessage::system(PLANNING_SYSTEM),
            ChatMessage::user(format!(
                "Request: {user_request}\n\nRepository context:\n{repo_context}"
            )),
        ];

        let mut parsed = None;
        let mut attempts = 0u32;
        let mut tool_rounds = 0u32;
        let mut last_detail = String::new();

        loop {
            let reply = self.chat.chat(&messages, tools).await?;

            if reply.has_tool_calls() && tool_rounds < self.config.max_planning_iterations {
                tool_rounds += 1;
                messages.push(ChatMessage::assistant(reply.content.clone()));
                for call in &reply.tool_calls {
                    let output = match dispatcher {
                        Some(dispatcher) if is_read_only_registered(dispatcher, &call.name) => {
                            dispatcher
                                .execute(&call.name, call.arguments.clone(), ctx, None)
                                .await
                        }
                        _ => format!(
                            "{{\"error\": \"tool '{}' is not available during planning\"}}",
                            call.name
                        ),
                    };
                    let truncated = truncate_chars(&output, TOOL_RESULT_CHAR_LIMIT);
                    messages.push(ChatMessage::tool(format!("{}: {truncated}", call.name)));
                }
                continue;
            }

            match parse_task_array(&reply.content) {
                Some(tasks) => {
                    parsed = Some(tasks);
                    break;
                }
                None => {
                    attempts += 1;
                    last_detail = truncate_chars(reply.content.trim(), 200);
                    if attempts > self.config.parse_retries {
                        break;
                    }
                    messages.push(ChatMessage::assistant(reply.content));
                    messages.push(ChatMessage::user(STRICT_SUFFIX));
                }
            }
        }

        let raw_tasks = parsed.ok_or(PlannerError::UnparseablePlan {
            attempts,
            detail: last_detail,
        })?;

        let mut tasks = Vec::new();
        for (action, description, complexity) in raw_tasks {
            let needs_breakdown = complexity.as_deref() == Some("high")
                || BROAD_TASK.is_match(&description);
            if needs_breakdown {
                match self.breakdown(&description, action).await {
                    Ok(subtasks) if !subtasks.is_empty() => {
                        tasks.extend(subtasks);
                        continue;
                    }
                    _ => tracing::debug!(task = %description, "breakdown failed; keeping broad task"),
                }
            }
            tasks.push(Task::new(action, description));
        }

        if tasks.is_empty() {
            return Err(PlannerError::EmptyPlan);
        }

        if self.config.coding_mode {
            ensure_test_and_doc_coverage(&mut tasks);
        }
        cap_plan_tasks(&mut tasks, self.config.max_plan_tasks);
        for task in &mut tasks {
            extract_validation_steps(task);
        }
        coerce_actionability(&mut tasks);

        let mut plan = ExecutionPlan::new(tasks);
        plan.goals = derive_goals(user_request, plan.mutates_code());
        Ok(plan)
    }

    /// Ask the model to decompose one broad task into 5-15 atomic subtasks.
    async fn breakdown(
        &self,
        description: &str,
        action: ActionKind,
    ) -> Result<Vec<Task>, PlannerError> {
        let messages = [
            ChatMessage::system(BREAKDOWN_SYSTEM),
            ChatMessage::user(format!("Broad task ({action}): {description}")),
        ];
        let reply = self.chat.chat(&messages, None).await?;
        let Some(parsed) = parse_task_array(&reply.content) else {
            return Ok(Vec::new());
        };
        if parsed.len() < 2 {
            return Ok(Vec::new());
        }
        Ok(parsed
            .into_iter()
            .take(15)
            .map(|(a, d, _)| Task::new(a, d))
            .collect())
    }
}

fn read_only_schemas(dispatcher: &Dispatcher) -> Vec<ToolSchema> {
    dispatcher
        .registry()
        .schemas()
        .into_iter()
        .filter(|(name, _, _)| {
            dispatcher
                .registry()
                .get(name)
                .is_some_and(|t| t.is_read_only())
        })
        .map(|(name, description, parameters)| ToolSchema {
            name,
            description,
            parameters,
        })
        .collect()
}

fn is_read_only_registered(dispatcher: &Dispatcher, name: &str) -> bool {
    dispatcher
        .registry()
        .get(name)
        .is_some_and(|t| t.is_read_only())
}

fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let cut: String = s.chars().take(limit).collect();
    format!("{cut}\n... [truncated]")
}

/// Coding plans that mutate code must carry at least one test task, and
/// get a doc task when none exists.
fn ensure_test_and_doc_coverage(tasks: &mut Vec<Task>) {
    let mutates = tasks.iter().any(|t| t.action.is_mutating());
    if !mutates {
        return;
    }
    if !tasks.iter().any(|t| t.action == ActionKind::Test) {
        tasks.push(Task::new(
            ActionKind::Test,
            "Run the project test suite to validate the changes",
        ));
    }
    if !tasks.iter().any(|t| t.action == ActionKind::Doc) {
        tasks.push(Task::new(
            ActionKind::Doc,
            "Update documentation for the changed behavior",
        ));
    }
}

static LINT_TASK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(lint|format|ruff|eslint|prettier|black|type[- ]check|mypy|tsc)\b").unwrap());

static TEST_TASK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(pytest|coverage|unit tests?|test suite|npm test)\b").unwrap());

/// Enforce the plan-size cap: merge all lint/format/type tasks into one,
/// merge all test/coverage tasks into one, then drop the lowest-value
/// tasks (doc, review, general) from the back. The merged validation
/// tasks are protected from trimming.
fn cap_plan_tasks(tasks: &mut Vec<Task>, max_tasks: usize) {
    if tasks.len() <= max_tasks {
        return;
    }

    merge_matching(tasks, &LINT_TASK, "Run lint, format, and type checks on the touched files");
    if tasks.len() > max_tasks {
        merge_matching(tasks, &TEST_TASK, "Run the full test suite with coverage");
    }

    let mut index = tasks.len();
    while tasks.len() > max_tasks && index > 0 {
        index -= 1;
        let task = &tasks[index];
        let droppable = matches!(
            task.action,
            ActionKind::Doc | ActionKind::Review | ActionKind::General
        ) && !is_protected(task);
        if droppable {
            tasks.remove(index);
        }
    }
}

fn is_protected(task: &Task) -> bool {
    task.description.starts_with("Run lint, format") || task.description.starts_with("Run the full test suite")
}

/// Merge all `test`-kind tasks whose description matches `pattern` into a
/// single task at the position of the first match.
fn merge_matching(tasks: &mut Vec<Task>, pattern: &Regex, merged_description: &str) {
    let matching: Vec<usize> = tasks
        .iter()
        .enumerate()
        .filter(|(_, t)| {
            matches!(t.action, ActionKind::Test | ActionKind::Run) && pattern.is_match(&t.description)
        })
        .map(|(i, _)| i)
        .collect();
    if matching.len() < 2 {
        return;
    }
    let first = matching[0];
    for index in matching.iter().skip(1).rev() {
        tasks.remove(*index);
    }
    tasks[first] = Task::new(ActionKind::Test, merged_description);
}

/// Make vague tasks actionable:
/// - a `review` task with no tool hint gets an explicit `list_dir` target
/// - an `edit` task that references no path becomes a `review` search task
fn coerce_actionability(tasks: &mut [Task]) {
    for task in tasks {
        match task.action {
            ActionKind::Review => {
                if !TOOL_HINT.is_match(&task.description) {
                    let target = PATH_HINT
                        .find(&task.description)
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_else(|| ".".to_string());
                    task.description = format!("{} using list_dir on {target}", task.description);
                }
            }
            ActionKind::Edit => {
                if !PATH_HINT.is_match(&task.description) {
                    task.action = ActionKind::Review;
                    task.description = format!(
                        "Search for the files relevant to: {} using search_code",
                        task.description
                    );
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
