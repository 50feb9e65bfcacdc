use anyhow::{Context, Result};
use std::path::PathBuf;

use rev_config::StateLayout;
use rev_memory::ProjectMemory;

fn memory_for(workspace: Option<String>) -> Result<ProjectMemory> {
    let root = match workspace {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    let layout = StateLayout::new(&root);
    Ok(ProjectMemory::new(layout.project_memory_file()))
}

pub fn show(workspace: Option<String>) -> Result<i32> {
    let memory = memory_for(workspace)?;
    print!("{}", memory.read()?);
    Ok(0)
}

pub fn record_failure(
    workspace: Option<String>,
    title: &str,
    symptom: &str,
    fix: &str,
) -> Result<i32> {
    let memory = memory_for(workspace)?;
    memory.record_failure_mode(title, symptom, fix, None)?;
    println!("recorded failure mode: {title}");
    Ok(0)
}
