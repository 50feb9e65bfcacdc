//! Tool registry and dispatch.
//!
//! Tools are self-contained units registered by name with a JSON schema.
//! The dispatcher normalizes argument aliases, validates against the
//! schema, resolves workspace paths, invokes the handler, and returns a
//! JSON string; failures are serialized through the error taxonomy and
//! never unwind into the orchestrator loop.

pub mod dispatch;
pub mod normalize;
pub mod registry;
pub mod schema;

pub use dispatch::Dispatcher;
pub use normalize::normalize_args;
pub use registry::{Tool, ToolRegistry};

/// Tools that only read workspace state.
pub const READ_ONLY_TOOLS: &[&str] = &[
    "read_file",
    "read_file_lines",
    "list_dir",
    "tree_view",
    "search_code",
    "get_file_info",
    "file_exists",
    "rag_search",
];

/// Tools that change workspace state. The verifier requires one of these
/// on every completed mutating task.
pub const WRITE_TOOLS: &[&str] = &[
    "write_file",
    "append_to_file",
    "replace_in_file",
    "apply_patch",
    "delete_file",
    "move_file",
    "copy_file",
    "create_directory",
    "split_python_module_classes",
];

pub fn is_read_only_tool(name: &str) -> bool {
    READ_ONLY_TOOLS.iter().any(|t| name.eq_ignore_ascii_case(t))
}

pub fn is_write_tool(name: &str) -> bool {
    WRITE_TOOLS.iter().any(|t| name.eq_ignore_ascii_case(t))
}
