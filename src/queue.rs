//! Bounded hand-off between arrival callbacks and the single output task.
//!
//! Producers never wait on the terminal: when the queue is full the item is
//! dropped with a warning, favouring fresh output and bounded memory over
//! completeness under sustained overload.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default number of pre-rendered blocks held before dropping.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// How long the consumer waits for an item before re-checking for shutdown.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PushError {
    #[error("queue is full, dropping message")]
    Full,

    #[error("output task has stopped")]
    Closed,
}

/// Producer side. Cheap to clone: one clone per subscribed interface.
#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
}

/// The one task draining the queue, in arrival order.
pub struct QueueConsumer {
    rx: mpsc::Receiver<String>,
    poll_timeout: Duration,
}

impl IngestQueue {
    pub fn new(capacity: usize) -> (Self, QueueConsumer) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queue = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        let consumer = QueueConsumer {
            rx,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        };
        (queue, consumer)
    }

    /// Enqueue without waiting. A full queue drops `item`.
    pub fn try_push(&self, item: String) -> Result<(), PushError> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(self.record_drop()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PushError::Closed),
        }
    }

    /// Enqueue, waiting up to `timeout` for room before dropping `item`.
    pub async fn push(&self, item: String, timeout: Duration) -> Result<(), PushError> {
        match self.tx.send_timeout(item, timeout).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => Err(self.record_drop()),
            Err(mpsc::error::SendTimeoutError::Closed(_)) => Err(PushError::Closed),
        }
    }

    /// Items dropped so far because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record_drop(&self) -> PushError {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        warn!("{}", PushError::Full);
        PushError::Full
    }
}

impl QueueConsumer {
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Write every item to `out` until cancelled or every producer is gone.
    ///
    /// Items are written as-is followed by a newline; the consumer does no
    /// formatting of its own.
    pub async fn run<W: Write>(mut self, mut out: W, cancel: CancellationToken) -> std::io::Result<()> {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("output consumer cancelled");
                    break;
                }
                next = tokio::time::timeout(self.poll_timeout, self.rx.recv()) => match next {
                    Ok(Some(item)) => {
                        writeln!(out, "{item}")?;
                        out.flush()?;
                    }
                    Ok(None) => break,
                    Err(_elapsed) => continue,
                },
            }
        }
        Ok(())
    }
}
