use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::runner::COMPLETION_MARKER;

/// Plan file picked up from the working directory when nothing is given.
pub const DEFAULT_PLAN_FILE: &str = "PLAN.md";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptSource {
    Prompt,
    Plan,
    Default,
}

impl fmt::Display for PromptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PromptSource::Prompt => "prompt",
            PromptSource::Plan => "plan",
            PromptSource::Default => "default",
        })
    }
}

/// Where the prompt text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptInput {
    /// Used verbatim.
    PromptFile(PathBuf),
    /// Wrapped in the plan template.
    PlanFile(PathBuf),
    Default,
}

impl PromptInput {
    pub fn source(&self) -> PromptSource {
        match self {
            PromptInput::PromptFile(_) => PromptSource::Prompt,
            PromptInput::PlanFile(_) => PromptSource::Plan,
            PromptInput::Default => PromptSource::Default,
        }
    }

    pub fn prompt_file(&self) -> Option<&Path> {
        match self {
            PromptInput::PromptFile(path) => Some(path),
            _ => None,
        }
    }

    pub fn plan_file(&self) -> Option<&Path> {
        match self {
            PromptInput::PlanFile(path) => Some(path),
            _ => None,
        }
    }

    pub fn resolve(&self) -> Result<String> {
        match self {
            PromptInput::PromptFile(path) => std::fs::read_to_string(path)
                .with_context(|| format!("reading prompt file {}", path.display())),
            PromptInput::PlanFile(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading plan file {}", path.display()))?;
                Ok(render_plan_prompt(path, &content))
            }
            PromptInput::Default => Ok(default_prompt()),
        }
    }
}

fn preamble() -> String {
    "You are an autonomous coding agent. You have access to tools: read, bash, edit, write."
        .to_string()
}

pub fn render_plan_prompt(plan_path: &Path, plan_content: &str) -> String {
    let mut prompt = format!(
        "{}\n\n\
         ## Instructions\n\
         - Study the plan/task carefully before starting\n\
         - Work through tasks methodically, one at a time\n\
         - Test your work after each significant change\n\
         - When ALL tasks are complete, reply with: {COMPLETION_MARKER}\n\n\
         ## Plan\n\
         Study the file at {} and implement all tasks described in it.\n",
        preamble(),
        plan_path.display()
    );
    if !plan_content.trim().is_empty() {
        prompt.push_str("\n### Plan Content\n");
        prompt.push_str(plan_content);
        if !plan_content.ends_with('\n') {
            prompt.push('\n');
        }
    }
    prompt
}

pub fn default_prompt() -> String {
    format!(
        "{}\n\n\
         Inspect the current project and determine what needs to be done.\n\n\
         When you have completed ALL tasks, reply with: {COMPLETION_MARKER}",
        preamble()
    )
}
