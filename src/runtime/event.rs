use crate::runner::RunStatus;
use crate::state::DisplayEvent;
use crate::types::AgentEvent;

/// Messages a live run sends to the dashboard.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    Agent(AgentEvent),
    Display(DisplayEvent),
    IterationFinished {
        iteration: u32,
        interrupted: bool,
        error: Option<String>,
    },
    /// The runner is blocked until a continue/stop decision arrives.
    ContinuePrompt,
    RunFinished {
        status: RunStatus,
        iterations: u32,
        error: Option<String>,
    },
}
