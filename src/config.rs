use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::agent::AgentKind;
use crate::prompt::{PromptInput, DEFAULT_PLAN_FILE};
use crate::store::DEFAULT_RUNS_DIR;
use crate::util::parse_bool_str;

const NO_TUI_ENV: &str = "RALFINHO_NO_TUI";

#[derive(Debug, Parser)]
#[command(name = "ralfinho", version)]
#[command(about = "Runs a coding agent in a loop until it reports completion")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List past runs, or open one in the read-only viewer
    View(ViewArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Prompt file, used verbatim
    #[arg(value_name = "PROMPT_FILE", conflicts_with_all = ["prompt", "plan"])]
    pub prompt_file: Option<PathBuf>,

    /// Explicit prompt file
    #[arg(long, value_name = "FILE", conflicts_with = "plan")]
    pub prompt: Option<PathBuf>,

    /// Plan file wrapped in the built-in plan prompt
    #[arg(long, value_name = "FILE")]
    pub plan: Option<PathBuf>,

    /// Agent to run (pi, claude, codex)
    #[arg(short, long, default_value = "pi")]
    pub agent: String,

    /// Stop after this many completed iterations, 0 = unlimited
    #[arg(short, long, value_name = "N", default_value_t = 0)]
    pub max_iterations: u32,

    /// Plain stderr output instead of the dashboard
    #[arg(long)]
    pub no_tui: bool,

    /// Directory holding run artifacts
    #[arg(long, value_name = "DIR", default_value = DEFAULT_RUNS_DIR)]
    pub runs_dir: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct ViewArgs {
    /// Run id or unique prefix; lists runs when omitted
    pub run_id: Option<String>,

    /// Directory holding run artifacts
    #[arg(long, value_name = "DIR", default_value = DEFAULT_RUNS_DIR)]
    pub runs_dir: PathBuf,
}

/// Validated settings for a live run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub agent: String,
    pub max_iterations: u32,
    pub prompt_input: PromptInput,
    pub no_tui: bool,
    pub runs_dir: PathBuf,
}

impl Config {
    pub fn load(args: RunArgs) -> Result<Self> {
        Self::load_in(args, Path::new("."))
    }

    /// Like [`Config::load`], looking for the fallback plan file in `cwd`.
    pub fn load_in(args: RunArgs, cwd: &Path) -> Result<Self> {
        let prompt_input = match (args.prompt.or(args.prompt_file), args.plan) {
            (Some(prompt), None) => PromptInput::PromptFile(prompt),
            (None, Some(plan)) => PromptInput::PlanFile(plan),
            (Some(_), Some(_)) => bail!("--prompt and --plan are mutually exclusive"),
            (None, None) => {
                let fallback = cwd.join(DEFAULT_PLAN_FILE);
                if fallback.is_file() {
                    PromptInput::PlanFile(PathBuf::from(DEFAULT_PLAN_FILE))
                } else {
                    PromptInput::Default
                }
            }
        };

        let no_tui = args.no_tui
            || std::env::var(NO_TUI_ENV)
                .ok()
                .and_then(|value| parse_bool_str(&value))
                .unwrap_or(false);

        Ok(Self {
            agent: args.agent,
            max_iterations: args.max_iterations,
            prompt_input,
            no_tui,
            runs_dir: args.runs_dir,
        })
    }

    pub fn validate(&self) -> Result<()> {
        AgentKind::from_name(&self.agent)?;
        if self.runs_dir.as_os_str().is_empty() {
            bail!("--runs-dir cannot be empty");
        }
        Ok(())
    }
}
