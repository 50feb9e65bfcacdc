use serde_json::Value;
use std::sync::Arc;

use rev_core::context::ExecutionContext;
use rev_core::error::{ToolError, ToolErrorKind};
use rev_core::task::TaskId;
use rev_workspace::{Workspace, WorkspacePathError};

use crate::normalize::normalize_args;
use crate::registry::ToolRegistry;
use crate::schema::validate_args;

pub const DEFAULT_TRUNCATE_BYTES: usize = 48_000;

/// Synchronous-from-the-loop's-perspective tool dispatch.
///
/// Takes the execution context by exclusive borrow, so two dispatches can
/// never interleave within a request; the result is always a JSON string
/// (success payload or serialized `ToolError`), never a panic or an
/// unwinding error.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    workspace: Workspace,
    truncate_bytes: usize,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, workspace: Workspace) -> Self {
        Self {
            registry,
            workspace,
            truncate_bytes: DEFAULT_TRUNCATE_BYTES,
        }
    }

    pub fn with_truncate_bytes(mut self, bytes: usize) -> Self {
        self.truncate_bytes = bytes;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Execute `name` with `args`, recording the call on the context.
    #[tracing::instrument(skip_all, fields(tool = name))]
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        ctx: &mut ExecutionContext,
        task_id: Option<TaskId>,
    ) -> String {
        match self.execute_inner(name, args, ctx, task_id).await {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(tool = name, %error, "tool execution failed");
                error.to_json().to_string()
            }
        }
    }

    async fn execute_inner(
        &self,
        name: &str,
        args: Value,
        ctx: &mut ExecutionContext,
        task_id: Option<TaskId>,
    ) -> Result<String, ToolError> {
        let tool = self.registry.get(name).ok_or_else(|| {
            ToolError::new(ToolErrorKind::NotFound, format!("Tool not found: {name}"))
        })?;

        let mut args = normalize_args(name, args);

        // Resolve the path argument up front: handlers only ever see
        // allowlisted absolute paths.
        if let Some(raw_path) = args.get("path").and_then(Value::as_str) {
            let resolved = self
                .workspace
                .resolve(raw_path, name)
                .map_err(path_error_to_tool_error)?;
            if tool.is_read_only() && name.eq_ignore_ascii_case("read_file") {
                let count = ctx.note_file_read(&resolved.rel_path);
                if count > 1 {
                    tracing::debug!(path = %resolved.rel_path, count, "repeated file read");
                }
            }
            if let Some(map) = args.as_object_mut() {
                map.insert(
                    "path".into(),
                    Value::String(resolved.abs_path.to_string_lossy().into_owned()),
                );
                map.insert("path_rel".into(), Value::String(resolved.rel_path));
            }
        }

        validate_args(&tool.input_schema(), &args)
            .map_err(|msg| ToolError::new(ToolErrorKind::ValidationError, format!("{name}: {msg}")))?;

        if let Some(task_id) = task_id {
            ctx.set_last_tool_call(task_id, name, args.clone());
        }

        let result = tool.execute(args).await?;
        let serialized = result.to_string();
        Ok(truncate_result(serialized, self.truncate_bytes))
    }
}

fn path_error_to_tool_error(err: WorkspacePathError) -> ToolError {
    let kind = match err {
        WorkspacePathError::Empty => ToolErrorKind::ValidationError,
        WorkspacePathError::OutsideAllowedRoots { .. } => ToolErrorKind::PermissionDenied,
    };
    ToolError::new(kind, err.to_string())
}

/// Truncate oversized textual results with an explicit marker.
pub fn truncate_result(result: String, limit: usize) -> String {
    if result.len() <= limit {
        return result;
    }
    let dropped = result.len() - limit;
    let mut cut = limit;
    while !result.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... [truncated {} bytes]", &result[..cut], dropped)
}
