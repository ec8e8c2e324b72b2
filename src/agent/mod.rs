pub mod process;
pub mod stream;

use std::process::ExitStatus;
use thiserror::Error;

pub use process::{execute, execute_command, ExecOutcome, LineSink, ProcessExecutor};
pub use stream::{decode_line, decode_output};

/// Agents the runner knows how to launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Pi,
    Claude,
    Codex,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::Pi, AgentKind::Claude, AgentKind::Codex];

    pub fn from_name(name: &str) -> Result<Self, AgentError> {
        match name {
            "pi" => Ok(AgentKind::Pi),
            "claude" => Ok(AgentKind::Claude),
            "codex" => Ok(AgentKind::Codex),
            other => Err(AgentError::UnknownAgent(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AgentKind::Pi => "pi",
            AgentKind::Claude => "claude",
            AgentKind::Codex => "codex",
        }
    }

    /// Executable and arguments for one iteration with `prompt`.
    pub fn command_line(self, prompt: &str) -> (&'static str, Vec<String>) {
        let prompt = prompt.to_string();
        match self {
            AgentKind::Pi => ("pi", vec!["--mode".into(), "json".into(), prompt]),
            AgentKind::Claude => (
                "claude",
                vec![
                    "--dangerously-skip-permissions".into(),
                    "--verbose".into(),
                    "--output-format".into(),
                    "stream-json".into(),
                    "-p".into(),
                    prompt,
                ],
            ),
            AgentKind::Codex => ("codex", vec!["exec".into(), "--full-auto".into(), prompt]),
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("unknown agent {0:?} (expected one of: pi, claude, codex)")]
    UnknownAgent(String),
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("agent exited with {status}")]
    Exit { status: ExitStatus },
    #[error("agent process was cancelled")]
    Cancelled,
    #[error("agent process i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Only used for log wording. The runner tracks interrupts explicitly.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }
}
