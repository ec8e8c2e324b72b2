use clap::Parser;
use futures::future::BoxFuture;
use ralfinho::agent::{ExecOutcome, LineSink};
use ralfinho::config::{Cli, Command, Config};
use ralfinho::prompt::PromptSource;
use ralfinho::runner::{AgentExecutor, InterruptDecider, RunStatus};
use ralfinho::session::{format_run_list, replay, LiveSession};
use ralfinho::store::{read_meta, RunStore, PROMPT_FILE};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Echoes the prompt back line by line, the way a confused agent would.
struct EchoExecutor {
    sink: LineSink,
}

impl AgentExecutor for EchoExecutor {
    fn execute<'a>(
        &'a self,
        _cancel: CancellationToken,
        _iteration: u32,
        _agent: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, ExecOutcome> {
        Box::pin(async move {
            let mut output = String::new();
            for line in prompt.lines() {
                (self.sink)(line);
                output.push_str(line);
                output.push('\n');
            }
            ExecOutcome::ok(output)
        })
    }
}

struct Refuse;

impl InterruptDecider for Refuse {
    fn should_continue(&mut self) -> BoxFuture<'_, anyhow::Result<bool>> {
        Box::pin(async { Ok(false) })
    }
}

fn load(args: &[&str], cwd: &Path) -> Config {
    let cli = Cli::try_parse_from(std::iter::once("ralfinho").chain(args.iter().copied()))
        .expect("arguments parse");
    assert!(cli.command.is_none());
    Config::load_in(cli.run, cwd).expect("config loads")
}

#[test]
fn test_view_subcommand_parses_prefix_and_runs_dir() {
    let cli = Cli::try_parse_from(["ralfinho", "view", "--runs-dir", "/tmp/r", "ab12"]).unwrap();
    match cli.command {
        Some(Command::View(args)) => {
            assert_eq!(args.run_id.as_deref(), Some("ab12"));
            assert_eq!(args.runs_dir, Path::new("/tmp/r"));
        }
        other => panic!("expected view, got {other:?}"),
    }
}

#[test]
fn test_negative_max_iterations_is_a_usage_error() {
    assert!(Cli::try_parse_from(["ralfinho", "-m", "-1"]).is_err());
}

#[tokio::test]
async fn test_echoed_plan_prompt_does_not_complete_run() {
    let dir = tempfile::tempdir().unwrap();
    let plan = dir.path().join("PLAN.md");
    std::fs::write(&plan, "- [ ] write the parser\n").unwrap();
    let runs = dir.path().join("runs");

    let config = load(
        &[
            "--plan",
            plan.to_str().unwrap(),
            "-m",
            "2",
            "--no-tui",
            "--runs-dir",
            runs.to_str().unwrap(),
        ],
        dir.path(),
    );
    assert_eq!(config.prompt_input.source(), PromptSource::Plan);

    let session = LiveSession::prepare(config)
        .unwrap()
        .with_sleep_between(Duration::from_millis(1));
    let run_dir = session.run_dir().to_path_buf();
    let prompt = std::fs::read_to_string(run_dir.join(PROMPT_FILE)).unwrap();
    assert!(prompt.contains("write the parser"));

    let executor = EchoExecutor {
        sink: session.line_sink(),
    };
    let summary = session.run_plain(executor, Refuse).await.unwrap();
    assert_eq!(summary.status, RunStatus::MaxIterationsReached);
    assert_eq!(summary.iterations_completed, 2);

    let meta = read_meta(&run_dir).unwrap();
    assert_eq!(meta.plan_file.as_deref(), Some(plan.as_path()));
    assert_eq!(meta.status, RunStatus::MaxIterationsReached);

    let store = RunStore::new(&runs);
    let listed = store.list_runs().unwrap();
    assert_eq!(listed.len(), 1);
    assert!(format_run_list(&listed).contains("(plan)"));

    let saved = store.load_run(&summary.run_id[..6]).unwrap();
    assert_eq!(saved.prompt.as_deref(), Some(prompt.as_str()));
    let model = replay(&saved);
    assert_eq!(model.run_status(), RunStatus::MaxIterationsReached);
    assert!(model
        .events()
        .iter()
        .any(|event| event.summary.contains("Iteration 2")));
}
