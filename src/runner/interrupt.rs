use tokio::sync::mpsc::{self, error::TrySendError};

/// Creates the single-slot interrupt channel.
///
/// At most one interrupt is pending at a time. Sending while one is already
/// pending drops the new request instead of queueing it, so a burst of
/// signals collapses into a single decision point.
pub fn interrupt_channel() -> (InterruptSender, InterruptReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (InterruptSender { tx }, InterruptReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct InterruptSender {
    tx: mpsc::Sender<()>,
}

impl InterruptSender {
    /// Returns `true` when this call filled the empty slot.
    pub fn notify(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                tracing::debug!("interrupt already pending, dropping request");
                false
            }
            Err(TrySendError::Closed(())) => false,
        }
    }
}

#[derive(Debug)]
pub struct InterruptReceiver {
    rx: mpsc::Receiver<()>,
}

impl InterruptReceiver {
    /// Waits for the next interrupt. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    /// Discards a pending interrupt, returning whether one was pending.
    pub fn clear(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}
