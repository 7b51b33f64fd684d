//! Bounded error channels.
//!
//! Every resource owns one channel through which its background tasks
//! publish failures to the supervisor. Producers never block: when the buffer
//! is full the consumer is assumed to have stalled, and the reporter takes
//! the logger's fatal path instead of silently dropping the error or waiting
//! for a reader that may never come.
use std::fmt;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, warn};

use crate::logger::Logger;

/// Creates a bounded error channel owned by `owner`.
///
/// A capacity of zero is treated as one.
pub fn error_channel<E>(
    owner: &str,
    capacity: usize,
    logger: Logger,
) -> (ErrorReporter<E>, ErrorReceiver<E>) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let reporter = ErrorReporter {
        owner: owner.to_string(),
        tx,
        logger,
    };
    (reporter, ErrorReceiver { rx, capacity })
}

/// Producer half. Clone it into every task that can fail.
pub struct ErrorReporter<E> {
    owner: String,
    tx: mpsc::Sender<E>,
    logger: Logger,
}

impl<E> Clone for ErrorReporter<E> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            tx: self.tx.clone(),
            logger: self.logger.clone(),
        }
    }
}

impl<E: fmt::Display> ErrorReporter<E> {
    /// Publishes `err` without blocking.
    ///
    /// If you do not read errors from the receiver, then once the buffer
    /// overflows the fatal hook runs, which by default exits the process with
    /// status 1.
    ///
    /// A receiver that has been dropped is not treated the same way: the
    /// error is logged at error level and discarded, and the process keeps
    /// running. Receivers are only dropped together with the resource that
    /// owns them, so such a report comes from a task that outlived its owner
    /// and nobody is left to act on it. Keep the receiver alive for as long
    /// as reporters can fire if their errors must not be lost.
    pub fn report(&self, err: E) {
        match self.tx.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                self.logger
                    .fatal(&format!("{} error channel is locked: {err}", self.owner));
            }
            Err(TrySendError::Closed(err)) => {
                error!(
                    "{} error channel has no reader, dropping error: {err}",
                    self.owner
                );
            }
        }
    }

    /// Publishes the error of a failed operation; success is a no-op.
    pub fn report_result<T>(&self, result: Result<T, E>) {
        if let Err(err) = result {
            self.report(err);
        }
    }

    /// Name of the component this channel belongs to.
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

/// Consumer half, held by the owning resource and drained by the supervisor.
pub struct ErrorReceiver<E> {
    rx: mpsc::Receiver<E>,
    capacity: usize,
}

impl<E> ErrorReceiver<E> {
    /// Waits for the next error. `None` once every reporter is gone.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Takes a pending error without waiting.
    pub fn try_recv(&mut self) -> Option<E> {
        match self.rx.try_recv() {
            Ok(err) => Some(err),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                warn!("error channel disconnected");
                None
            }
        }
    }

    /// Number of errors waiting to be read.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True when no error is waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Fixed buffer size chosen at construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<E> fmt::Debug for ErrorReceiver<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReceiver")
            .field("pending", &self.rx.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
