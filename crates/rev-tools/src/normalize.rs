use serde_json::{Map, Value};

/// Global argument aliases applied to every tool: canonical key on the
/// right. Applied only when the canonical key is absent, so normalization
/// preserves all non-alias keys and is idempotent.
const GLOBAL_ALIASES: &[(&str, &str)] = &[
    ("file", "path"),
    ("filepath", "path"),
    ("file_path", "path"),
    ("src", "path"),
    ("source", "path"),
    ("module", "path"),
    ("text", "content"),
    ("contents", "content"),
];

/// Extra aliases for find/replace style tools.
const REPLACE_TOOL_ALIASES: &[(&str, &str)] = &[
    ("old_string", "find"),
    ("new_string", "replace"),
];

fn is_replace_tool(tool: &str) -> bool {
    tool.eq_ignore_ascii_case("replace_in_file")
}

/// Normalize LLM-emitted tool arguments:
/// 1. unwrap a nested `{"arguments": {...}}` wrapper,
/// 2. kebab-case keys become snake_case,
/// 3. global aliases map to canonical names,
/// 4. tool-specific aliases (find/replace tools) map likewise.
pub fn normalize_args(tool: &str, args: Value) -> Value {
    let mut map = match args {
        Value::Object(map) => map,
        other => return other,
    };

    // Unwrap {"arguments": {...}} when it is the sole key.
    if map.len() == 1 && matches!(map.get("arguments"), Some(Value::Object(_))) {
        if let Some(Value::Object(inner)) = map.remove("arguments") {
            map = inner;
        }
    }

    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        out.insert(key.replace('-', "_"), value);
    }

    apply_aliases(&mut out, GLOBAL_ALIASES);
    if is_replace_tool(tool) {
        apply_aliases(&mut out, REPLACE_TOOL_ALIASES);
    }

    Value::Object(out)
}

fn apply_aliases(map: &mut Map<String, Value>, aliases: &[(&str, &str)]) {
    for (alias, canonical) in aliases {
        if let Some(value) = map.remove(*alias) {
            // The canonical key always wins; the alias is consumed either way.
            if !map.contains_key(*canonical) {
                map.insert(canonical.to_string(), value);
            }
        }
    }
}
