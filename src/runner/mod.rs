pub mod interrupt;
pub mod marker;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentError, AgentKind, ExecOutcome};

pub use interrupt::{interrupt_channel, InterruptReceiver, InterruptSender};
pub use marker::{has_completion_marker, COMPLETION_MARKER};

pub const DEFAULT_SLEEP_BETWEEN: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Interrupted,
    MaxIterationsReached,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Interrupted => "interrupted",
            RunStatus::MaxIterationsReached => "max_iterations_reached",
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Failed => 1,
            RunStatus::Interrupted => 2,
            RunStatus::Running | RunStatus::Completed | RunStatus::MaxIterationsReached => 0,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid run configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("interrupt decision failed: {0:#}")]
    Decision(anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub agent: String,
    pub prompt: String,
    /// `0` means unlimited.
    pub max_iterations: u32,
    pub sleep_between: Duration,
}

impl RunConfig {
    pub fn new(agent: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            prompt: prompt.into(),
            max_iterations: 0,
            sleep_between: DEFAULT_SLEEP_BETWEEN,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_sleep_between(mut self, sleep_between: Duration) -> Self {
        self.sleep_between = sleep_between;
        self
    }

    pub fn validate(&self) -> Result<(), RunError> {
        AgentKind::from_name(&self.agent)?;
        if self.prompt.trim().is_empty() {
            return Err(RunError::Config("prompt is empty".to_string()));
        }
        Ok(())
    }
}

/// What one pass of the loop produced, handed to the observer.
#[derive(Debug)]
pub struct IterationReport {
    pub iteration: u32,
    pub output: String,
    pub error: Option<AgentError>,
    pub interrupted: bool,
}

impl IterationReport {
    /// Every non-blank output line decodes to exactly one event.
    pub fn event_count(&self) -> usize {
        self.output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .count()
    }

    pub fn summary_line(&self) -> String {
        let outcome = if self.interrupted {
            "interrupted".to_string()
        } else if let Some(err) = &self.error {
            format!("error: {err}")
        } else {
            "ok".to_string()
        };
        format!(
            "iteration {} {} ({} events)",
            self.iteration,
            outcome,
            self.event_count()
        )
    }
}

/// Final snapshot of a run.
#[derive(Debug)]
pub struct RunResult {
    pub status: RunStatus,
    pub iterations_completed: u32,
    pub last_output: String,
    /// Set for `Failed` runs.
    pub error: Option<RunError>,
}

/// Runs one agent execution. Implemented by the process adapter and by
/// scripted executors in tests.
pub trait AgentExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        cancel: CancellationToken,
        iteration: u32,
        agent: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, ExecOutcome>;
}

pub trait IterationObserver: Send {
    fn iteration_started(&mut self, _iteration: u32) {}
    fn iteration_finished(&mut self, report: &IterationReport);
}

/// Asked whether to keep going after an interrupt.
pub trait InterruptDecider: Send {
    fn should_continue(&mut self) -> BoxFuture<'_, anyhow::Result<bool>>;
}

enum Pause {
    Elapsed,
    Interrupted,
    Cancelled,
}

enum Decision {
    Continue,
    Stop,
    Cancelled,
    Failed(anyhow::Error),
}

/// Drives the iteration loop for one run.
pub struct Runner<E> {
    config: RunConfig,
    executor: E,
    interrupts: Option<InterruptReceiver>,
    observer: Option<Box<dyn IterationObserver>>,
    decider: Option<Box<dyn InterruptDecider>>,
    cancel: CancellationToken,
}

impl<E: AgentExecutor> Runner<E> {
    /// Fails fast on configuration errors, before any iteration starts.
    pub fn new(config: RunConfig, executor: E) -> Result<Self, RunError> {
        config.validate()?;
        Ok(Self {
            config,
            executor,
            interrupts: None,
            observer: None,
            decider: None,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_interrupts(mut self, interrupts: InterruptReceiver) -> Self {
        self.interrupts = Some(interrupts);
        self
    }

    pub fn with_observer(mut self, observer: impl IterationObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn with_decider(mut self, decider: impl InterruptDecider + 'static) -> Self {
        self.decider = Some(Box::new(decider));
        self
    }

    /// Parent token for the whole run. Cancelling it ends the run as
    /// interrupted without asking for a decision.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub async fn run(mut self) -> RunResult {
        let mut completed = 0u32;
        let mut last_output = String::new();
        let mut iteration = 1u32;

        loop {
            if self.config.max_iterations > 0 && completed >= self.config.max_iterations {
                return finish(RunStatus::MaxIterationsReached, completed, last_output, None);
            }
            if self.cancel.is_cancelled() {
                return finish(RunStatus::Interrupted, completed, last_output, None);
            }

            tracing::info!(iteration, agent = %self.config.agent, "starting iteration");
            if let Some(observer) = self.observer.as_mut() {
                observer.iteration_started(iteration);
            }

            let (outcome, interrupted) = self.execute_iteration(iteration).await;
            let report = IterationReport {
                iteration,
                output: outcome.output,
                error: outcome.error,
                interrupted,
            };
            tracing::info!(
                iteration,
                interrupted,
                error = report.error.as_ref().map(tracing::field::display),
                "iteration finished"
            );
            if let Some(observer) = self.observer.as_mut() {
                observer.iteration_finished(&report);
            }
            let IterationReport { output, error, .. } = report;
            last_output = output;

            if self.cancel.is_cancelled() {
                return finish(RunStatus::Interrupted, completed, last_output, None);
            }

            if interrupted {
                match self.decide().await {
                    Decision::Continue => {
                        tracing::info!(iteration, "retrying interrupted iteration");
                        continue;
                    }
                    Decision::Stop | Decision::Cancelled => {
                        return finish(RunStatus::Interrupted, completed, last_output, None)
                    }
                    Decision::Failed(err) => {
                        return finish(
                            RunStatus::Failed,
                            completed,
                            last_output,
                            Some(RunError::Decision(err)),
                        )
                    }
                }
            }

            if let Some(err) = error {
                return finish(
                    RunStatus::Failed,
                    completed,
                    last_output,
                    Some(RunError::Agent(err)),
                );
            }

            completed += 1;
            if has_completion_marker(&last_output) {
                tracing::info!(iteration, "completion marker found");
                return finish(RunStatus::Completed, completed, last_output, None);
            }

            match self.pause().await {
                Pause::Elapsed => {}
                Pause::Cancelled => {
                    return finish(RunStatus::Interrupted, completed, last_output, None)
                }
                Pause::Interrupted => match self.decide().await {
                    Decision::Continue => {}
                    Decision::Stop | Decision::Cancelled => {
                        return finish(RunStatus::Interrupted, completed, last_output, None)
                    }
                    Decision::Failed(err) => {
                        return finish(
                            RunStatus::Failed,
                            completed,
                            last_output,
                            Some(RunError::Decision(err)),
                        )
                    }
                },
            }

            iteration += 1;
        }
    }

    /// Runs the agent under a per-iteration child token; an interrupt
    /// cancels only that token.
    async fn execute_iteration(&mut self, iteration: u32) -> (ExecOutcome, bool) {
        let iteration_token = self.cancel.child_token();
        let exec = self.executor.execute(
            iteration_token.clone(),
            iteration,
            &self.config.agent,
            &self.config.prompt,
        );
        tokio::pin!(exec);

        let Some(interrupts) = self.interrupts.as_mut() else {
            return (exec.await, false);
        };

        let mut interrupted = false;
        let outcome = loop {
            tokio::select! {
                outcome = &mut exec => break outcome,
                Some(()) = interrupts.recv(), if !interrupted => {
                    tracing::info!(iteration, "interrupt requested, cancelling iteration");
                    interrupted = true;
                    iteration_token.cancel();
                }
            }
        };
        (outcome, interrupted)
    }

    async fn pause(&mut self) -> Pause {
        let sleep = tokio::time::sleep(self.config.sleep_between);
        tokio::pin!(sleep);

        match self.interrupts.as_mut() {
            Some(interrupts) => tokio::select! {
                _ = &mut sleep => Pause::Elapsed,
                _ = self.cancel.cancelled() => Pause::Cancelled,
                Some(()) = interrupts.recv() => Pause::Interrupted,
            },
            None => tokio::select! {
                _ = &mut sleep => Pause::Elapsed,
                _ = self.cancel.cancelled() => Pause::Cancelled,
            },
        }
    }

    async fn decide(&mut self) -> Decision {
        let Some(decider) = self.decider.as_mut() else {
            return Decision::Stop;
        };

        let decision = tokio::select! {
            answer = decider.should_continue() => match answer {
                Ok(true) => Decision::Continue,
                Ok(false) => Decision::Stop,
                Err(err) => Decision::Failed(err),
            },
            _ = self.cancel.cancelled() => Decision::Cancelled,
        };

        // Interrupts raised while the question was open are answered by it.
        if let Some(interrupts) = self.interrupts.as_mut() {
            interrupts.clear();
        }
        decision
    }
}

fn finish(
    status: RunStatus,
    iterations_completed: u32,
    last_output: String,
    error: Option<RunError>,
) -> RunResult {
    match &error {
        Some(err) => tracing::warn!(%status, iterations_completed, error = %err, "run finished"),
        None => tracing::info!(%status, iterations_completed, "run finished"),
    }
    RunResult {
        status,
        iterations_completed,
        last_output,
        error,
    }
}
