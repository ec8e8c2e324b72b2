use futures::future::BoxFuture;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use super::{AgentError, AgentKind};
use crate::runner::AgentExecutor;

const LINE_CHANNEL_CAPACITY: usize = 128;
/// How long output keeps draining after a cancelled child was signalled.
const CANCEL_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Called once per output line, in arrival order.
pub type LineSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Everything one agent execution produced.
#[derive(Debug, Default)]
pub struct ExecOutcome {
    /// Every captured line, each terminated by `\n`.
    pub output: String,
    pub error: Option<AgentError>,
}

impl ExecOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(error: AgentError) -> Self {
        Self {
            output: String::new(),
            error: Some(error),
        }
    }
}

/// Runs `agent` once with `prompt`, resolving it through the agent table.
pub async fn execute(
    cancel: CancellationToken,
    agent: &str,
    prompt: &str,
    on_line: Option<LineSink>,
) -> ExecOutcome {
    let kind = match AgentKind::from_name(agent) {
        Ok(kind) => kind,
        Err(err) => return ExecOutcome::failed(err),
    };
    let (program, args) = kind.command_line(prompt);
    execute_command(cancel, program, &args, on_line).await
}

/// Spawns `program`, drains stdout and stderr concurrently and waits for it.
///
/// Lines from one stream keep their order. Lines from different streams are
/// merged in whatever order the two reader tasks deliver them.
pub async fn execute_command(
    cancel: CancellationToken,
    program: &str,
    args: &[String],
    on_line: Option<LineSink>,
) -> ExecOutcome {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(source) => {
            return ExecOutcome::failed(AgentError::Spawn {
                program: program.to_string(),
                source,
            })
        }
    };
    tracing::debug!(program, pid = child.id(), "agent process started");

    let (tx, mut rx) = mpsc::channel::<String>(LINE_CHANNEL_CAPACITY);
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(drain_lines(stdout, tx.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(drain_lines(stderr, tx.clone())));
    }
    let reader_aborts: Vec<AbortHandle> = readers.iter().map(|r| r.abort_handle()).collect();

    // The merged channel closes once both readers finish and this task drops
    // the last sender.
    let merge = tokio::spawn(async move {
        for reader in readers {
            let _ = reader.await;
        }
        drop(tx);
    });

    let mut output = String::new();
    let mut cancelled = false;
    let grace = tokio::time::sleep(Duration::MAX);
    tokio::pin!(grace);

    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => {
                    output.push_str(&line);
                    output.push('\n');
                    if let Some(sink) = &on_line {
                        sink(&line);
                    }
                }
                None => break,
            },
            _ = cancel.cancelled(), if !cancelled => {
                cancelled = true;
                tracing::debug!(program, "cancelling agent process");
                if let Err(err) = child.start_kill() {
                    tracing::warn!(program, error = %err, "failed to signal agent process");
                }
                grace.as_mut().reset(tokio::time::Instant::now() + CANCEL_DRAIN_GRACE);
            }
            _ = &mut grace, if cancelled => {
                // Descendants may still hold the pipes open.
                for abort in &reader_aborts {
                    abort.abort();
                }
                break;
            }
        }
    }
    merge.abort();

    // The pipes can close while the child keeps running.
    let status = if cancelled {
        child.wait().await
    } else {
        tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => {
                cancelled = true;
                tracing::debug!(program, "cancelling agent process after its output closed");
                if let Err(err) = child.start_kill() {
                    tracing::warn!(program, error = %err, "failed to signal agent process");
                }
                child.wait().await
            }
        }
    };
    let error = if cancelled {
        Some(AgentError::Cancelled)
    } else {
        match status {
            Ok(status) if status.success() => None,
            Ok(status) => Some(AgentError::Exit { status }),
            Err(err) => Some(AgentError::Io(err)),
        }
    };
    tracing::debug!(program, ?error, bytes = output.len(), "agent process finished");

    ExecOutcome { output, error }
}

async fn drain_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(strip_line_ending(&buf)).into_owned();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "agent pipe read failed");
                break;
            }
        }
    }
}

fn strip_line_ending(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

/// Launches the configured agent for every iteration.
#[derive(Clone, Default)]
pub struct ProcessExecutor {
    on_line: Option<LineSink>,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line_sink(on_line: LineSink) -> Self {
        Self {
            on_line: Some(on_line),
        }
    }
}

impl AgentExecutor for ProcessExecutor {
    fn execute<'a>(
        &'a self,
        cancel: CancellationToken,
        _iteration: u32,
        agent: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, ExecOutcome> {
        Box::pin(execute(cancel, agent, prompt, self.on_line.clone()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_execute_collects_both_streams() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: LineSink = Arc::new(move |line: &str| {
            sink_seen.lock().unwrap().push(line.to_string());
        });

        let outcome = execute_command(
            CancellationToken::new(),
            "sh",
            &sh("echo out1; echo err1 >&2; echo out2; echo err2 >&2"),
            Some(sink),
        )
        .await;

        assert!(outcome.error.is_none(), "{:?}", outcome.error);
        let lines: Vec<&str> = outcome.output.lines().collect();
        assert_eq!(lines.len(), 4);

        // Order inside one stream is preserved; across streams it is not fixed.
        let stdout: Vec<&str> = lines.iter().copied().filter(|l| l.starts_with("out")).collect();
        let stderr: Vec<&str> = lines.iter().copied().filter(|l| l.starts_with("err")).collect();
        assert_eq!(stdout, vec!["out1", "out2"]);
        assert_eq!(stderr, vec!["err1", "err2"]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4, "each line reaches the sink exactly once");
        assert_eq!(seen.join("\n") + "\n", outcome.output);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_reported_with_output() {
        let outcome =
            execute_command(CancellationToken::new(), "sh", &sh("echo partial; exit 3"), None)
                .await;
        assert_eq!(outcome.output, "partial\n");
        match outcome.error {
            Some(AgentError::Exit { status }) => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_a_spawn_error() {
        let outcome = execute_command(
            CancellationToken::new(),
            "ralfinho-definitely-missing-binary",
            &[],
            None,
        )
        .await;
        assert!(matches!(outcome.error, Some(AgentError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_unknown_agent_fails_without_spawning() {
        let outcome = execute(CancellationToken::new(), "nope", "prompt", None).await;
        assert!(matches!(outcome.error, Some(AgentError::UnknownAgent(_))));
        assert!(outcome.output.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_process_promptly() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let outcome =
            execute_command(cancel, "sh", &sh("echo before; exec sleep 30"), None).await;

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(matches!(outcome.error, Some(AgentError::Cancelled)));
        assert_eq!(outcome.output, "before\n");
    }

    #[tokio::test]
    async fn test_cancellation_reaches_child_after_its_output_closed() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let outcome = execute_command(
            cancel,
            "sh",
            &sh("echo hi; exec >/dev/null 2>&1; sleep 5"),
            None,
        )
        .await;

        assert!(
            started.elapsed() < Duration::from_secs(3),
            "took {:?}",
            started.elapsed()
        );
        assert!(matches!(outcome.error, Some(AgentError::Cancelled)));
        assert_eq!(outcome.output, "hi\n");
    }
}
