//! Zero-capacity handoff between the message source and the worker pool.
//!
//! A push completes only once a worker has taken the message, so the source
//! can never run ahead of the pool by more than the message it is holding.
//! Closing the channel is the drain signal for workers.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch, Mutex};

use crate::kafka::RawMessage;

type Envelope = (RawMessage, oneshot::Sender<()>);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("dispatch channel closed")]
pub struct DispatchClosed;

/// Create a connected sender/receiver pair.
pub fn dispatch_channel() -> (DispatchSender, DispatchReceiver) {
    let (tx, rx) = mpsc::channel(1);
    let (closed_tx, closed_rx) = watch::channel(false);

    (
        DispatchSender {
            tx,
            closed: closed_rx,
        },
        DispatchReceiver {
            rx: Mutex::new(rx),
            closed: closed_tx,
        },
    )
}

/// Write end, owned by the message source.
pub struct DispatchSender {
    tx: mpsc::Sender<Envelope>,
    closed: watch::Receiver<bool>,
}

impl DispatchSender {
    /// Block until a worker accepts `message`.
    ///
    /// Fails once the channel is closed. A message whose push failed was not
    /// handed to any worker.
    pub async fn push(&self, message: RawMessage) -> Result<(), DispatchClosed> {
        let mut closed = self.closed.clone();
        if *closed.borrow() {
            return Err(DispatchClosed);
        }

        let (ack_tx, ack_rx) = oneshot::channel();

        tokio::select! {
            biased;
            sent = self.tx.send((message, ack_tx)) => sent.map_err(|_| DispatchClosed)?,
            _ = closed.wait_for(|c| *c) => return Err(DispatchClosed),
        }

        tokio::select! {
            biased;
            ack = ack_rx => ack.map_err(|_| DispatchClosed),
            _ = closed.wait_for(|c| *c) => Err(DispatchClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow() || self.tx.is_closed()
    }
}

/// Read end, shared by every worker of the pool.
pub struct DispatchReceiver {
    rx: Mutex<mpsc::Receiver<Envelope>>,
    closed: watch::Sender<bool>,
}

impl DispatchReceiver {
    /// Wait for the next message. `None` once the channel is closed.
    pub async fn pop(&self) -> Option<RawMessage> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return None;
        }

        let mut rx = tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => return None,
            guard = self.rx.lock() => guard,
        };

        loop {
            let (message, ack) = tokio::select! {
                biased;
                _ = closed.wait_for(|c| *c) => return None,
                envelope = rx.recv() => envelope?,
            };

            // The pusher gave up on this message; it was never handed off.
            if ack.send(()).is_ok() {
                return Some(message);
            }
        }
    }

    /// Close the channel. Pending and future pops return `None`, pushes fail.
    /// Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        !self.closed.send_replace(true)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}
