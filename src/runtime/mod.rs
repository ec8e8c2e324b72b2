pub mod event;
pub mod frontend;

use crate::app::{DashboardCommand, DashboardModel, DashboardMsg};
use crate::runner::InterruptSender;
use anyhow::Result;
use crossterm::event::Event;
use event::RuntimeEvent;
use frontend::FrontendAdapter;
use futures::{Stream, StreamExt};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Where dashboard commands go. A viewer has neither an interrupt slot nor a
/// decision channel.
#[derive(Default)]
pub struct RuntimeLinks {
    pub interrupts: Option<InterruptSender>,
    pub decisions: Option<mpsc::Sender<bool>>,
    /// Cancelled when the user quits.
    pub quit: CancellationToken,
}

/// Single consumer of dashboard messages: terminal input, run events and
/// spinner ticks all funnel through one loop that owns the model.
pub struct Runtime {
    model: DashboardModel,
    events: mpsc::UnboundedReceiver<RuntimeEvent>,
    links: RuntimeLinks,
}

impl Runtime {
    pub fn new(
        model: DashboardModel,
        events: mpsc::UnboundedReceiver<RuntimeEvent>,
        links: RuntimeLinks,
    ) -> Self {
        Self {
            model,
            events,
            links,
        }
    }

    /// Runs until the user quits. Returns the final model.
    pub async fn run<F, S>(self, frontend: &mut F, mut input: S) -> Result<DashboardModel>
    where
        F: FrontendAdapter,
        S: Stream<Item = io::Result<Event>> + Unpin,
    {
        let Runtime {
            mut model,
            mut events,
            links,
        } = self;

        let (width, height) = frontend.size()?;
        model = model.update(DashboardMsg::Resize { width, height }).0;
        frontend.draw(&mut model)?;

        let mut tick = tokio::time::interval(TICK_INTERVAL);
        let mut input_open = true;
        let mut events_open = true;

        loop {
            let msg = tokio::select! {
                _ = tick.tick() => DashboardMsg::Tick,
                next = input.next(), if input_open => match next {
                    Some(Ok(Event::Key(key))) => DashboardMsg::Key(key),
                    Some(Ok(Event::Resize(width, height))) => DashboardMsg::Resize { width, height },
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => return Err(err.into()),
                    None => {
                        input_open = false;
                        continue;
                    }
                },
                next = events.recv(), if events_open => match next {
                    Some(event) => DashboardMsg::Run(event),
                    None => {
                        events_open = false;
                        continue;
                    }
                },
            };

            let (next, command) = model.update(msg);
            model = next;
            match command {
                Some(DashboardCommand::Quit) => {
                    tracing::info!("dashboard quit requested");
                    links.quit.cancel();
                    break;
                }
                Some(DashboardCommand::RequestInterrupt) => {
                    if let Some(interrupts) = &links.interrupts {
                        if !interrupts.notify() {
                            tracing::debug!("interrupt already pending");
                        }
                    }
                }
                Some(DashboardCommand::Decide(resume)) => {
                    if let Some(decisions) = &links.decisions {
                        if decisions.send(resume).await.is_err() {
                            tracing::warn!("runner no longer waits for a decision");
                        }
                    }
                }
                None => {}
            }
            frontend.draw(&mut model)?;
        }

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{interrupt_channel, RunStatus};
    use crate::state::DisplayEvent;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::{backend::TestBackend, Terminal};

    fn key(ch: char) -> io::Result<Event> {
        Ok(Event::Key(KeyEvent::new(KeyCode::Char(ch), KeyModifiers::NONE)))
    }

    #[tokio::test]
    async fn test_quit_cancels_token_and_returns_model() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(RuntimeEvent::Display(DisplayEvent::info("hello", 1)))
            .unwrap();
        let links = RuntimeLinks::default();
        let quit = links.quit.clone();

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let input = futures::stream::iter(vec![key('q'), key('q')]).chain(futures::stream::pending());
        let runtime = Runtime::new(DashboardModel::live("run", "pi"), rx, links);
        let model = runtime.run(&mut terminal, Box::pin(input)).await.unwrap();

        assert!(quit.is_cancelled());
        assert_eq!(model.events().len(), 1);
    }

    #[tokio::test]
    async fn test_interrupt_and_decision_are_forwarded() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (interrupt_tx, mut interrupt_rx) = interrupt_channel();
        let (decision_tx, mut decision_rx) = mpsc::channel(1);
        let links = RuntimeLinks {
            interrupts: Some(interrupt_tx),
            decisions: Some(decision_tx),
            quit: CancellationToken::new(),
        };

        let (input_tx, input_rx) = mpsc::unbounded_channel::<io::Result<Event>>();
        let input = channel_stream(input_rx);
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let runtime = Runtime::new(DashboardModel::live("run", "pi"), rx, links);
        let handle = tokio::spawn(async move { runtime.run(&mut terminal, input).await });

        input_tx.send(key('i')).unwrap();
        interrupt_rx.recv().await;

        tx.send(RuntimeEvent::ContinuePrompt).unwrap();
        // let the prompt land before answering
        tokio::time::sleep(Duration::from_millis(50)).await;
        input_tx.send(key('n')).unwrap();
        assert_eq!(decision_rx.recv().await, Some(false));

        tx.send(RuntimeEvent::RunFinished {
            status: RunStatus::Interrupted,
            iterations: 0,
            error: None,
        })
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        input_tx.send(key('q')).unwrap();
        input_tx.send(key('q')).unwrap();

        let model = handle.await.unwrap().unwrap();
        assert_eq!(model.run_status(), RunStatus::Interrupted);
        assert!(!model.is_running());
    }

    fn channel_stream(
        mut rx: mpsc::UnboundedReceiver<io::Result<Event>>,
    ) -> impl Stream<Item = io::Result<Event>> + Unpin {
        Box::pin(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)))
    }
}
