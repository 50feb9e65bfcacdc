//! Durable project memory: `<workspace>/.rev/memory/project_summary.md`.
//!
//! An append-only, intentionally concise markdown file the planner reads
//! for context. Five fixed level-2 sections; entries are deduped by title
//! prefix and the recent-changes window is bounded.
//!
//! Write rules (keep memory trustworthy): write when a task completes,
//! when a failure mode is diagnosed, and when a convention is introduced.

use anyhow::{Context, Result};
use chrono::Utc;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const SECTION_ORDER: &[&str] = &[
    "What This Repo Is",
    "Current Architecture",
    "Known Failure Modes + Fixes",
    "Conventions",
    "Recently Changed Files",
];

const PLACEHOLDER: &str = "- (none recorded)";
const RECENT_CHANGES_MAX_LINES: usize = 30;
const FAILURE_SECTION_MAX_LINES: usize = 60;

#[derive(Debug, Clone)]
pub struct ProjectMemory {
    file_path: PathBuf,
}

impl ProjectMemory {
    pub fn new(file_path: PathBuf) -> Self {
        Self { file_path }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Create the memory file with the default template if missing.
    pub fn ensure(&self) -> Result<()> {
        if self.file_path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create memory dir: {}", parent.display()))?;
        }
        fs::write(&self.file_path, default_template())
            .with_context(|| format!("failed to write memory file: {}", self.file_path.display()))
    }

    /// Full rendered content (for planner context).
    pub fn read(&self) -> Result<String> {
        self.ensure()?;
        fs::read_to_string(&self.file_path)
            .with_context(|| format!("failed to read memory file: {}", self.file_path.display()))
    }

    /// Update "Recently Changed Files" with a compact timestamped entry.
    pub fn record_recent_changes(
        &self,
        created: &[String],
        modified: &[String],
        deleted: &[String],
    ) -> Result<()> {
        if created.is_empty() && modified.is_empty() && deleted.is_empty() {
            return Ok(());
        }
        let mut sections = self.load_sections()?;

        let mut entry = vec![format!("- {}", utc_stamp())];
        for (label, files) in [("created", created), ("modified", modified), ("deleted", deleted)] {
            if !files.is_empty() {
                let shown: Vec<&str> = files
                    .iter()
                    .rev()
                    .take(10)
                    .rev()
                    .map(String::as_str)
                    .collect();
                entry.push(format!("  - {label}: {}", shown.join(", ")));
            }
        }

        let existing = drop_placeholder(sections.remove("Recently Changed Files").unwrap_or_default());
        let mut merged = entry;
        merged.push(String::new());
        merged.extend(existing);
        merged.truncate(RECENT_CHANGES_MAX_LINES);
        sections.insert("Recently Changed Files".to_string(), merged);

        self.save_sections(&sections)
    }

    /// Insert a known-failure entry. Deduped by title prefix: recording
    /// the same title twice is a no-op.
    pub fn record_failure_mode(
        &self,
        title: &str,
        symptom: &str,
        fix: &str,
        evidence_ref: Option<&str>,
    ) -> Result<()> {
        let mut sections = self.load_sections()?;
        let existing =
            drop_placeholder(sections.remove("Known Failure Modes + Fixes").unwrap_or_default());

        let prefix = format!("- {title} ");
        if existing.iter().any(|l| l.trim_start().starts_with(&prefix)) {
            sections.insert("Known Failure Modes + Fixes".to_string(), existing);
            return self.save_sections(&sections);
        }

        tracing::debug!(title, "recording known failure mode");
        let mut entry = vec![
            format!("- {title} ({})", utc_stamp()),
            format!("  - symptom: {symptom}"),
            format!("  - fix: {fix}"),
        ];
        if let Some(evidence) = evidence_ref {
            entry.push(format!("  - evidence: {evidence}"));
        }
        entry.push(String::new());
        entry.extend(existing);
        entry.truncate(FAILURE_SECTION_MAX_LINES);
        sections.insert("Known Failure Modes + Fixes".to_string(), entry);

        self.save_sections(&sections)
    }

    /// Record a convention line (deduped on exact text).
    pub fn record_convention(&self, convention: &str) -> Result<()> {
        let mut sections = self.load_sections()?;
        let mut existing = drop_placeholder(sections.remove("Conventions").unwrap_or_default());
        let line = format!("- {convention}");
        if !existing.iter().any(|l| l.trim() == line) {
            existing.push(line);
        }
        sections.insert("Conventions".to_string(), existing);
        self.save_sections(&sections)
    }

    /// Heuristic: if `error_text` matches a known failure signature,
    /// record it once. Returns true when an entry was written.
    pub fn maybe_record_known_failure_from_error(&self, error_text: &str) -> Result<bool> {
        let text = error_text.to_lowercase();

        if text.contains("outside allowed workspace roots") || text.contains("--add-root") {
            self.record_failure_mode(
                "Workspace path outside allowed roots",
                "Tools/verifiers reject a path as outside the workspace",
                "Run rev from the target repo root or allowlist the directory via '--add-root <path>'.",
                None,
            )?;
            return Ok(true);
        }

        if text.contains("could not determine file path to verify") {
            self.record_failure_mode(
                "Verification cannot determine file path",
                "Verifier reports it cannot determine the file path to verify",
                "Ensure tool results include path_abs/path_rel so the verifier can fall back to tool args.",
                None,
            )?;
            return Ok(true);
        }

        Ok(false)
    }

    fn load_sections(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let raw = self.read()?;
        Ok(parse_sections(&raw))
    }

    fn save_sections(&self, sections: &BTreeMap<String, Vec<String>>) -> Result<()> {
        let rendered = render_sections(sections);
        // Atomic replace: write a sibling temp file, then rename over.
        let tmp_path = self.file_path.with_extension("md.tmp");
        fs::write(&tmp_path, rendered)
            .with_context(|| format!("failed to write temp memory file: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.file_path).with_context(|| {
            format!("failed to replace memory file {}", self.file_path.display())
        })
    }
}

fn utc_stamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%MZ").to_string()
}

fn default_template() -> String {
    let mut out = String::from(
        "# Project Memory (rev)\n\n\
         This file is maintained automatically by rev.\n\
         It is intentionally concise and operational.\n\n",
    );
    for name in SECTION_ORDER {
        out.push_str(&format!("## {name}\n{PLACEHOLDER}\n\n"));
    }
    out.trim_end().to_string() + "\n"
}

/// Parse level-2 sections; content before the first heading is dropped.
fn parse_sections(md: &str) -> BTreeMap<String, Vec<String>> {
    let heading = Regex::new(r"^##\s+(.*?)\s*$").unwrap();
    let mut sections: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut current: Option<String> = None;
    for line in md.lines() {
        if let Some(caps) = heading.captures(line) {
            let name = caps[1].to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        if let Some(name) = &current {
            sections.get_mut(name).unwrap().push(line.to_string());
        }
    }
    sections
}

fn render_sections(sections: &BTreeMap<String, Vec<String>>) -> String {
    let mut parts = vec![
        "# Project Memory (rev)".to_string(),
        String::new(),
        "This file is maintained automatically by rev.".to_string(),
        "It is intentionally concise and operational.".to_string(),
        String::new(),
    ];
    for name in SECTION_ORDER {
        parts.push(format!("## {name}"));
        let body = sections.get(*name).cloned().unwrap_or_default();
        let trimmed = trim_blank_edges(body);
        if trimmed.is_empty() {
            parts.push(PLACEHOLDER.to_string());
        } else {
            parts.extend(trimmed);
        }
        parts.push(String::new());
    }
    parts.join("\n").trim_end().to_string() + "\n"
}

fn trim_blank_edges(mut lines: Vec<String>) -> Vec<String> {
    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines
}

fn drop_placeholder(lines: Vec<String>) -> Vec<String> {
    trim_blank_edges(
        lines
            .into_iter()
            .filter(|l| !l.contains("(none recorded)"))
            .collect(),
    )
}
