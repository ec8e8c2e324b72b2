//! Wires a run together: artifact directory, runner, event pipeline and
//! either the dashboard or plain stderr output. Also hosts the read-only
//! viewer over saved runs.

use anyhow::{Context, Result};
use chrono::Utc;
use crossterm::event::EventStream;
use futures::future::BoxFuture;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{decode_line, LineSink, ProcessExecutor};
use crate::app::DashboardModel;
use crate::config::{Config, ViewArgs};
use crate::logging::{self, LogTarget};
use crate::runner::{
    interrupt_channel, AgentExecutor, InterruptDecider, InterruptSender, IterationObserver,
    IterationReport, RunConfig, RunResult, RunStatus, Runner,
};
use crate::runtime::event::RuntimeEvent;
use crate::runtime::{Runtime, RuntimeLinks};
use crate::state::{DisplayEvent, DisplayKind, EventConverter};
use crate::store::{Artifacts, RunDir, RunMeta, RunStore, SavedRun};
use crate::terminal::{self, TerminalGuard};
use crate::types::AgentEvent;
use crate::util::short_id;

/// What the caller reports once a live run is over.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub run_dir: std::path::PathBuf,
    pub status: RunStatus,
    pub iterations_completed: u32,
    pub error: Option<String>,
    /// First artifact write that failed, if any. The run itself went on.
    pub persistence_warning: Option<String>,
}

impl RunSummary {
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    pub fn render(&self) -> String {
        let mut out = String::from("\n");
        out.push_str(&format!("run-id:     {}\n", self.run_id));
        out.push_str(&format!("iterations: {}\n", self.iterations_completed));
        out.push_str(&format!("status:     {}\n", self.status));
        out.push_str(&format!("artifacts:  {}\n", self.run_dir.display()));
        if let Some(error) = &self.error {
            out.push_str(&format!("error:      {error}\n"));
        }
        if let Some(warning) = &self.persistence_warning {
            out.push_str(&format!("warning:    {warning}\n"));
        }
        out
    }
}

/// Starts a live run: dashboard when stdout is a terminal and it was not
/// turned off, plain stderr output otherwise.
pub async fn run_live(config: Config) -> Result<RunSummary> {
    let dashboard = !config.no_tui && terminal::stdout_is_terminal();
    let session = LiveSession::prepare(config)?;

    logging::init(if dashboard {
        LogTarget::for_dashboard(session.run_dir())
    } else {
        LogTarget::resolve(LogTarget::Stderr)
    });
    info!(run_id = session.run_id(), dashboard, "run started");

    let executor = ProcessExecutor::with_line_sink(session.line_sink());
    if dashboard {
        session.run_dashboard(executor).await
    } else {
        session.run_plain(executor, StdinDecider).await
    }
}

enum PipelineItem {
    IterationStarted(u32),
    Event(AgentEvent),
    IterationFinished {
        iteration: u32,
        interrupted: bool,
        error: Option<String>,
        output: String,
        summary: String,
    },
}

/// A prepared run: artifacts exist and `meta.json` says `running`.
pub struct LiveSession {
    run_config: RunConfig,
    run: RunDir,
    meta: RunMeta,
    recorder: Recorder,
    pipeline_tx: mpsc::UnboundedSender<PipelineItem>,
    pipeline_rx: mpsc::UnboundedReceiver<PipelineItem>,
}

impl LiveSession {
    pub fn prepare(config: Config) -> Result<Self> {
        config.validate()?;
        let prompt = config.prompt_input.resolve()?;
        let run_config =
            RunConfig::new(&config.agent, prompt).with_max_iterations(config.max_iterations);
        run_config.validate()?;

        let run = RunStore::new(&config.runs_dir).create_run()?;
        let artifacts = Artifacts::open(&run.path)?;
        artifacts.write_prompt(&run_config.prompt)?;

        let meta = RunMeta {
            run_id: run.id.clone(),
            started_at: Utc::now(),
            ended_at: None,
            status: RunStatus::Running,
            agent: config.agent.clone(),
            prompt_source: config.prompt_input.source(),
            prompt_file: config.prompt_input.prompt_file().map(Path::to_path_buf),
            plan_file: config.prompt_input.plan_file().map(Path::to_path_buf),
            max_iterations: config.max_iterations,
            iterations_completed: 0,
            events_count: 0,
        };
        artifacts.write_meta(&meta)?;

        let (pipeline_tx, pipeline_rx) = mpsc::unbounded_channel();
        Ok(Self {
            run_config,
            run,
            meta,
            recorder: Recorder::new(artifacts),
            pipeline_tx,
            pipeline_rx,
        })
    }

    pub fn with_sleep_between(mut self, sleep_between: Duration) -> Self {
        self.run_config = self.run_config.with_sleep_between(sleep_between);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run.id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run.path
    }

    /// Feeds decoded agent lines into the event pipeline as they arrive.
    pub fn line_sink(&self) -> LineSink {
        let pipeline = self.pipeline_tx.clone();
        Arc::new(move |line: &str| {
            if let Some(event) = decode_line(line) {
                let _ = pipeline.send(PipelineItem::Event(event));
            }
        })
    }

    pub async fn run_plain<E: AgentExecutor>(
        self,
        executor: E,
        decider: impl InterruptDecider + 'static,
    ) -> Result<RunSummary> {
        let LiveSession {
            run_config,
            run,
            meta,
            recorder,
            pipeline_tx,
            pipeline_rx,
        } = self;

        let (interrupt_tx, interrupt_rx) = interrupt_channel();
        let pipeline = tokio::spawn(run_pipeline(
            pipeline_rx,
            recorder,
            Forward::Plain(PlainPrinter::new()),
        ));
        let runner = Runner::new(run_config, executor)?
            .with_interrupts(interrupt_rx)
            .with_observer(SessionObserver {
                pipeline: pipeline_tx,
            })
            .with_decider(decider);

        let signals = tokio::spawn(forward_ctrl_c(interrupt_tx));
        let result = runner.run().await;
        signals.abort();

        let recorder = pipeline.await.context("event pipeline task failed")?;
        Ok(finalize(run, meta, recorder, &result))
    }

    pub async fn run_dashboard<E: AgentExecutor + 'static>(
        self,
        executor: E,
    ) -> Result<RunSummary> {
        let LiveSession {
            run_config,
            run,
            meta,
            recorder,
            pipeline_tx,
            pipeline_rx,
        } = self;

        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let (decision_tx, decision_rx) = mpsc::channel(1);
        let (interrupt_tx, interrupt_rx) = interrupt_channel();
        let cancel = CancellationToken::new();

        let pipeline = tokio::spawn(run_pipeline(
            pipeline_rx,
            recorder,
            Forward::Dashboard(ui_tx.clone()),
        ));
        let model = DashboardModel::live(&run.id, &run_config.agent);
        let _ = ui_tx.send(prompt_event(&run_config.prompt));
        let runner = Runner::new(run_config, executor)?
            .with_interrupts(interrupt_rx)
            .with_observer(SessionObserver {
                pipeline: pipeline_tx,
            })
            .with_decider(DashboardDecider {
                events: ui_tx.clone(),
                decisions: decision_rx,
            })
            .with_cancellation(cancel.clone());

        let run_task: JoinHandle<(RunResult, Result<Recorder>)> = tokio::spawn(async move {
            let result = runner.run().await;
            let recorder = pipeline.await.context("event pipeline task failed");
            let _ = ui_tx.send(RuntimeEvent::RunFinished {
                status: result.status,
                iterations: result.iterations_completed,
                error: result.error.as_ref().map(ToString::to_string),
            });
            (result, recorder)
        });

        let links = RuntimeLinks {
            interrupts: Some(interrupt_tx),
            decisions: Some(decision_tx),
            quit: cancel.clone(),
        };
        let ui_result = match TerminalGuard::new() {
            Ok(mut guard) => Runtime::new(model, ui_rx, links)
                .run(&mut *guard, EventStream::new())
                .await
                .map(|_| ()),
            Err(err) => Err(err),
        };
        if let Err(err) = &ui_result {
            warn!(error = %format!("{err:#}"), "dashboard failed, stopping run");
            cancel.cancel();
        }

        let (result, recorder) = run_task.await.context("runner task failed")?;
        let summary = finalize(run, meta, recorder?, &result);
        ui_result?;
        Ok(summary)
    }
}

fn finalize(run: RunDir, mut meta: RunMeta, mut recorder: Recorder, result: &RunResult) -> RunSummary {
    meta.ended_at = Some(Utc::now());
    meta.status = result.status;
    meta.iterations_completed = result.iterations_completed;
    meta.events_count = recorder.artifacts.events_count();
    let written = recorder.artifacts.write_meta(&meta);
    recorder.record("meta", written);

    info!(
        run_id = %meta.run_id,
        status = %meta.status,
        iterations = meta.iterations_completed,
        events = meta.events_count,
        "run finished"
    );

    RunSummary {
        run_id: run.id,
        run_dir: run.path,
        status: result.status,
        iterations_completed: result.iterations_completed,
        error: result.error.as_ref().map(ToString::to_string),
        persistence_warning: recorder.warning(),
    }
}

/// Single writer for the run's artifacts. Failures are logged and counted
/// but never stop the run.
struct Recorder {
    artifacts: Artifacts,
    first_error: Option<anyhow::Error>,
    failures: usize,
}

impl Recorder {
    fn new(artifacts: Artifacts) -> Self {
        Self {
            artifacts,
            first_error: None,
            failures: 0,
        }
    }

    fn record(&mut self, what: &str, result: Result<()>) {
        let Err(err) = result else {
            return;
        };
        warn!(what, error = %format!("{err:#}"), "failed to persist run artifact");
        self.failures += 1;
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }

    fn warning(&self) -> Option<String> {
        self.first_error.as_ref().map(|err| {
            format!(
                "{} artifact write(s) failed, first: {err:#}",
                self.failures
            )
        })
    }
}

enum Forward {
    Dashboard(mpsc::UnboundedSender<RuntimeEvent>),
    Plain(PlainPrinter),
}

impl Forward {
    fn event(&mut self, event: AgentEvent) {
        match self {
            // The dashboard may already be gone after a quit.
            Forward::Dashboard(ui) => {
                let _ = ui.send(RuntimeEvent::Agent(event));
            }
            Forward::Plain(printer) => {
                for line in printer.lines(&event) {
                    eprintln!("{line}");
                }
            }
        }
    }

    fn iteration_finished(
        &mut self,
        iteration: u32,
        interrupted: bool,
        error: Option<String>,
        summary: &str,
    ) {
        match self {
            Forward::Dashboard(ui) => {
                let _ = ui.send(RuntimeEvent::IterationFinished {
                    iteration,
                    interrupted,
                    error,
                });
            }
            Forward::Plain(_) => eprintln!("{summary}"),
        }
    }
}

async fn run_pipeline(
    mut items: mpsc::UnboundedReceiver<PipelineItem>,
    mut recorder: Recorder,
    mut forward: Forward,
) -> Recorder {
    while let Some(item) = items.recv().await {
        match item {
            PipelineItem::IterationStarted(iteration) => {
                let event = AgentEvent::Iteration { iteration };
                let written = recorder.artifacts.append_events(std::slice::from_ref(&event));
                recorder.record("events", written);
                forward.event(event);
            }
            PipelineItem::Event(event) => {
                let written = recorder.artifacts.append_events(std::slice::from_ref(&event));
                recorder.record("events", written);
                forward.event(event);
            }
            PipelineItem::IterationFinished {
                iteration,
                interrupted,
                error,
                output,
                summary,
            } => {
                let written = recorder.artifacts.append_raw_output(iteration, &output);
                recorder.record("raw output", written);
                let written = recorder.artifacts.append_session_line(&summary);
                recorder.record("session log", written);
                forward.iteration_finished(iteration, interrupted, error, &summary);
            }
        }
    }
    recorder
}

struct SessionObserver {
    pipeline: mpsc::UnboundedSender<PipelineItem>,
}

impl IterationObserver for SessionObserver {
    fn iteration_started(&mut self, iteration: u32) {
        let _ = self.pipeline.send(PipelineItem::IterationStarted(iteration));
    }

    fn iteration_finished(&mut self, report: &IterationReport) {
        let _ = self.pipeline.send(PipelineItem::IterationFinished {
            iteration: report.iteration,
            interrupted: report.interrupted,
            error: report.error.as_ref().map(ToString::to_string),
            output: report.output.clone(),
            summary: report.summary_line(),
        });
    }
}

/// Turns agent events into stderr lines. Streaming text deltas are
/// skipped; the finished message is printed in full.
pub struct PlainPrinter {
    converter: EventConverter,
}

impl PlainPrinter {
    pub fn new() -> Self {
        Self {
            converter: EventConverter::new(),
        }
    }

    pub fn lines(&mut self, event: &AgentEvent) -> Vec<String> {
        let from_update = matches!(event, AgentEvent::MessageUpdate { .. });
        let mut out = Vec::new();
        for display in self.converter.convert(event) {
            if display.kind == DisplayKind::AssistantText {
                if from_update {
                    continue;
                }
                out.push(display.summary);
                out.extend(display.detail.lines().map(|line| format!("  {line}")));
                continue;
            }
            out.push(display.summary);
        }
        out
    }
}

impl Default for PlainPrinter {
    fn default() -> Self {
        Self::new()
    }
}

async fn forward_ctrl_c(interrupts: InterruptSender) {
    while tokio::signal::ctrl_c().await.is_ok() {
        if interrupts.notify() {
            eprintln!("interrupt requested, stopping the current iteration");
        }
    }
}

/// Asks on the terminal. End of input counts as "no".
pub struct StdinDecider;

impl InterruptDecider for StdinDecider {
    fn should_continue(&mut self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async {
            let answer = tokio::task::spawn_blocking(|| -> io::Result<String> {
                let mut stderr = io::stderr();
                write!(stderr, "Continue? [y/N] ")?;
                stderr.flush()?;
                let mut line = String::new();
                io::stdin().read_line(&mut line)?;
                Ok(line)
            })
            .await
            .context("decision prompt task failed")?
            .context("reading decision from stdin")?;
            Ok(parse_answer(&answer))
        })
    }
}

pub fn parse_answer(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Shows the continue prompt in the dashboard and waits for the key.
struct DashboardDecider {
    events: mpsc::UnboundedSender<RuntimeEvent>,
    decisions: mpsc::Receiver<bool>,
}

impl InterruptDecider for DashboardDecider {
    fn should_continue(&mut self) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            if self.events.send(RuntimeEvent::ContinuePrompt).is_err() {
                return Ok(false);
            }
            // A closed dashboard cannot ask, so the run stops.
            Ok(self.decisions.recv().await.unwrap_or(false))
        })
    }
}

/// `view` without an id lists runs, with an id opens the viewer.
pub async fn run_view(args: ViewArgs) -> Result<()> {
    let store = RunStore::new(&args.runs_dir);
    let Some(prefix) = args.run_id else {
        let runs = store.list_runs()?;
        if runs.is_empty() {
            println!("no runs in {}", store.root().display());
        } else {
            print!("{}", format_run_list(&runs));
        }
        return Ok(());
    };

    let saved = store.load_run(&prefix)?;
    let model = replay(&saved);

    if !terminal::stdout_is_terminal() {
        for event in model.events() {
            println!("{}", event.summary);
        }
        return Ok(());
    }

    // Stderr belongs to the dashboard, so only an explicit log file is used.
    if let LogTarget::File(path) = LogTarget::resolve(LogTarget::Stderr) {
        logging::init(LogTarget::File(path));
    }
    info!(run_id = %saved.meta.run_id, events = saved.events.len(), "opening viewer");

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    drop(events_tx);
    let mut guard = TerminalGuard::new()?;
    Runtime::new(model, events_rx, RuntimeLinks::default())
        .run(&mut *guard, EventStream::new())
        .await?;
    Ok(())
}

/// Stream entry carrying the prompt the agent was given.
fn prompt_event(prompt: &str) -> RuntimeEvent {
    RuntimeEvent::Display(DisplayEvent::new(
        DisplayKind::UserMessage,
        "→ Effective prompt",
        prompt,
        0,
    ))
}

/// Rebuilds the dashboard state of a saved run.
pub fn replay(saved: &SavedRun) -> DashboardModel {
    let prompt = saved.prompt.as_deref().map(prompt_event);
    prompt
        .into_iter()
        .chain(saved.events.iter().cloned().map(RuntimeEvent::Agent))
        .fold(DashboardModel::viewer(&saved.meta), |model, event| {
            model.update(event.into()).0
        })
}

pub fn format_run_list(runs: &[RunMeta]) -> String {
    runs.iter()
        .map(|meta| {
            format!(
                "  {}  {}  {:<22}  {:>3} iterations  ({})\n",
                short_id(&meta.run_id),
                meta.started_local().format("%Y-%m-%d %H:%M"),
                meta.status.as_str(),
                meta.iterations_completed,
                meta.prompt_source,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ExecOutcome;
    use anyhow::anyhow;
    use crate::prompt::{PromptInput, PromptSource};
    use crate::store::{read_events, read_meta, RAW_OUTPUT_FILE, SESSION_FILE};
    use std::sync::Mutex;

    const TEXT_RUN: [&str; 4] = [
        r#"{"type":"message_start","message":{"role":"assistant","model":"m1"}}"#,
        r#"{"type":"message_update","assistantMessageEvent":{"type":"text_delta","delta":"Hel"}}"#,
        r#"{"type":"message_update","assistantMessageEvent":{"type":"text_delta","delta":"lo"}}"#,
        r#"{"type":"message_end","message":{"role":"assistant","content":[{"type":"text","text":"Hello"}]}}"#,
    ];

    fn config_in(dir: &Path, max_iterations: u32) -> Config {
        Config {
            agent: "pi".to_string(),
            max_iterations,
            prompt_input: PromptInput::Default,
            no_tui: true,
            runs_dir: dir.join("runs"),
        }
    }

    /// Streams its script through the session's line sink like the process
    /// adapter does, then returns the joined output.
    struct SinkExecutor {
        sink: LineSink,
        outputs: Mutex<Vec<Vec<String>>>,
    }

    impl SinkExecutor {
        fn new(sink: LineSink, outputs: Vec<Vec<&str>>) -> Self {
            let outputs = outputs
                .into_iter()
                .rev()
                .map(|lines| lines.into_iter().map(str::to_string).collect())
                .collect();
            Self {
                sink,
                outputs: Mutex::new(outputs),
            }
        }
    }

    impl AgentExecutor for SinkExecutor {
        fn execute<'a>(
            &'a self,
            _cancel: CancellationToken,
            _iteration: u32,
            _agent: &'a str,
            _prompt: &'a str,
        ) -> BoxFuture<'a, ExecOutcome> {
            let lines = self.outputs.lock().unwrap().pop().unwrap_or_default();
            for line in &lines {
                (self.sink)(line);
            }
            Box::pin(async move { ExecOutcome::ok(lines.join("\n")) })
        }
    }

    struct NeverAsked;

    impl InterruptDecider for NeverAsked {
        fn should_continue(&mut self) -> BoxFuture<'_, Result<bool>> {
            Box::pin(async { Err(anyhow!("no interrupt was sent")) })
        }
    }

    #[tokio::test]
    async fn test_plain_run_persists_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let session = LiveSession::prepare(config_in(dir.path(), 2))
            .unwrap()
            .with_sleep_between(Duration::from_millis(1));
        let run_dir = session.run_dir().to_path_buf();
        assert_eq!(read_meta(&run_dir).unwrap().status, RunStatus::Running);

        let mut second = TEXT_RUN.to_vec();
        second.push(r#"{"type":"agent_end","messages":[]}"#);
        let executor = SinkExecutor::new(session.line_sink(), vec![TEXT_RUN.to_vec(), second]);
        let summary = session.run_plain(executor, NeverAsked).await.unwrap();

        assert_eq!(summary.status, RunStatus::MaxIterationsReached);
        assert_eq!(summary.iterations_completed, 2);
        assert_eq!(summary.exit_code(), 0);
        assert!(summary.persistence_warning.is_none());

        let events = read_events(&run_dir).unwrap();
        assert_eq!(events.len(), 2 + 4 + 5);
        assert_eq!(events[0], AgentEvent::Iteration { iteration: 1 });
        assert_eq!(events[5], AgentEvent::Iteration { iteration: 2 });

        let meta = read_meta(&run_dir).unwrap();
        assert_eq!(meta.status, RunStatus::MaxIterationsReached);
        assert_eq!(meta.iterations_completed, 2);
        assert_eq!(meta.events_count, events.len());
        assert_eq!(meta.prompt_source, PromptSource::Default);
        assert!(meta.ended_at.is_some());

        let raw = std::fs::read_to_string(run_dir.join(RAW_OUTPUT_FILE)).unwrap();
        assert!(raw.contains("text_delta"));
        let session_log = std::fs::read_to_string(run_dir.join(SESSION_FILE)).unwrap();
        assert_eq!(session_log.lines().count(), 2);
        assert!(session_log.contains("iteration 1 ok (4 events)"));
    }

    #[tokio::test]
    async fn test_completion_marker_ends_plain_run() {
        let dir = tempfile::tempdir().unwrap();
        let session = LiveSession::prepare(config_in(dir.path(), 0))
            .unwrap()
            .with_sleep_between(Duration::from_millis(1));
        let done = r#"{"type":"message_end","message":{"role":"assistant","content":[{"type":"text","text":"all set <promise>COMPLETE</promise>"}]}}"#;
        let executor = SinkExecutor::new(
            session.line_sink(),
            vec![TEXT_RUN.to_vec(), vec![done]],
        );
        let summary = session.run_plain(executor, NeverAsked).await.unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.iterations_completed, 2);
    }

    #[test]
    fn test_prepare_rejects_unknown_agent() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path(), 0);
        config.agent = "gpt".to_string();
        assert!(LiveSession::prepare(config).is_err());
        assert!(!dir.path().join("runs").exists());
    }

    #[tokio::test]
    async fn test_pipeline_forwards_to_dashboard_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Artifacts::open(dir.path()).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
        let pipeline = tokio::spawn(run_pipeline(
            rx,
            Recorder::new(artifacts),
            Forward::Dashboard(ui_tx),
        ));

        tx.send(PipelineItem::IterationStarted(1)).unwrap();
        tx.send(PipelineItem::Event(AgentEvent::TurnStart)).unwrap();
        tx.send(PipelineItem::IterationFinished {
            iteration: 1,
            interrupted: true,
            error: None,
            output: String::new(),
            summary: "iteration 1 interrupted (0 events)".to_string(),
        })
        .unwrap();
        drop(tx);

        let recorder = pipeline.await.unwrap();
        assert_eq!(recorder.artifacts.events_count(), 2);
        assert!(recorder.warning().is_none());

        assert!(matches!(
            ui_rx.recv().await,
            Some(RuntimeEvent::Agent(AgentEvent::Iteration { iteration: 1 }))
        ));
        assert!(matches!(
            ui_rx.recv().await,
            Some(RuntimeEvent::Agent(AgentEvent::TurnStart))
        ));
        assert!(matches!(
            ui_rx.recv().await,
            Some(RuntimeEvent::IterationFinished {
                iteration: 1,
                interrupted: true,
                ..
            })
        ));
    }

    #[test]
    fn test_recorder_keeps_first_error_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new(Artifacts::open(dir.path()).unwrap());
        recorder.record("events", Ok(()));
        recorder.record("events", Err(anyhow!("disk full")));
        recorder.record("meta", Err(anyhow!("read-only")));

        let warning = recorder.warning().unwrap();
        assert!(warning.starts_with("2 artifact write(s) failed"));
        assert!(warning.contains("disk full"));
        assert!(!warning.contains("read-only"));
    }

    #[test]
    fn test_plain_printer_skips_deltas_and_prints_final_text() {
        let mut printer = PlainPrinter::new();
        let lines: Vec<String> = TEXT_RUN
            .iter()
            .filter_map(|line| decode_line(line))
            .flat_map(|event| printer.lines(&event))
            .collect();

        assert!(!lines.iter().any(|line| line.contains("Hel") && !line.contains("Hello")));
        assert!(lines.iter().any(|line| line.contains("Assistant text (5 chars)")));
        assert_eq!(lines.last().map(String::as_str), Some("  Hello"));
    }

    #[test]
    fn test_parse_answer() {
        assert!(parse_answer("y\n"));
        assert!(parse_answer(" YES "));
        assert!(!parse_answer("\n"));
        assert!(!parse_answer("no"));
        assert!(!parse_answer(""));
    }

    #[tokio::test]
    async fn test_dashboard_decider_stops_when_dashboard_is_gone() {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (decision_tx, decisions) = mpsc::channel(1);
        let mut decider = DashboardDecider { events, decisions };

        decision_tx.send(true).await.unwrap();
        assert!(decider.should_continue().await.unwrap());

        drop(decision_tx);
        assert!(!decider.should_continue().await.unwrap());

        drop(events_rx);
        assert!(!decider.should_continue().await.unwrap());
    }

    #[test]
    fn test_replay_rebuilds_viewer_model() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        let run = store.create_run().unwrap();
        let mut artifacts = Artifacts::open(&run.path).unwrap();
        let mut events = vec![AgentEvent::Iteration { iteration: 1 }];
        events.extend(TEXT_RUN.iter().filter_map(|line| decode_line(line)));
        artifacts.append_events(&events).unwrap();
        artifacts.write_prompt("fix the tests").unwrap();
        let meta = RunMeta {
            run_id: run.id.clone(),
            started_at: Utc::now(),
            ended_at: Some(Utc::now()),
            status: RunStatus::Completed,
            agent: "pi".to_string(),
            prompt_source: PromptSource::Default,
            prompt_file: None,
            plan_file: None,
            max_iterations: 0,
            iterations_completed: 1,
            events_count: events.len(),
        };
        artifacts.write_meta(&meta).unwrap();

        let saved = store.load_run(short_id(&run.id)).unwrap();
        let model = replay(&saved);
        assert!(!model.is_running());
        assert_eq!(model.run_status(), RunStatus::Completed);
        let first = &model.events()[0];
        assert_eq!(first.kind, DisplayKind::UserMessage);
        assert_eq!(first.detail, "fix the tests");
        assert!(model
            .events()
            .iter()
            .any(|event| event.summary.contains("Assistant text (5 chars)")));

        let listing = format_run_list(&[meta]);
        assert!(listing.contains(short_id(&run.id)));
        assert!(listing.contains("completed"));
        assert!(listing.contains("1 iterations"));
        assert!(listing.contains("(default)"));
    }

    #[test]
    fn test_summary_render_mentions_warning() {
        let summary = RunSummary {
            run_id: "abc".to_string(),
            run_dir: "runs/abc".into(),
            status: RunStatus::Failed,
            iterations_completed: 3,
            error: Some("agent exited with status 1".to_string()),
            persistence_warning: Some("1 artifact write(s) failed".to_string()),
        };
        let text = summary.render();
        assert!(text.contains("run-id:     abc"));
        assert!(text.contains("status:     failed"));
        assert!(text.contains("warning:"));
        assert_eq!(summary.exit_code(), RunStatus::Failed.exit_code());
    }
}
