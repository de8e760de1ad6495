//! Progress channel between the dispatcher/monitor and the caller.
//!
//! Events flow one way over an unbounded mpsc channel. Dropping every
//! receiver closes the channel, which running monitors treat as cancellation.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::PeriwatchError;

/// Percent value reserved for error and failure events.
pub const FAILURE_PERCENT: i32 = -1;

pub const STARTING_MESSAGE: &str = "Generating PDF...";
pub const BACKGROUND_MESSAGE: &str = "Processing in background, will be emailed when ready";
pub const COMPLETED_MESSAGE: &str = "PDF completed";
pub const PARTIAL_MESSAGE: &str = "PDF partially generated, full version will be emailed";
pub const MONITOR_TIMEOUT_MESSAGE: &str = "Monitoring timeout - check your email";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub message: String,
    /// 0..=100, or -1 for failure.
    pub percent: i32,
}

impl ProgressEvent {
    pub fn new(message: impl Into<String>, percent: i32) -> Self {
        Self {
            message: message.into(),
            percent: percent.clamp(FAILURE_PERCENT, 100),
        }
    }

    /// Final event for a failed submit.
    pub fn submit_error(err: &PeriwatchError) -> Self {
        Self::new(format!("Error: {err}"), FAILURE_PERCENT)
    }

    /// Final event for a failed status poll.
    pub fn monitoring_error(err: &PeriwatchError) -> Self {
        Self::new(format!("Monitoring error: {err}"), FAILURE_PERCENT)
    }

    pub fn monitor_timeout() -> Self {
        Self::new(MONITOR_TIMEOUT_MESSAGE, 90)
    }

    pub fn is_failure(&self) -> bool {
        self.percent == FAILURE_PERCENT
    }
}

/// Create a connected sender/receiver pair.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx: Some(tx) }, ProgressReceiver { rx })
}

/// Sending half. Cheap to clone; every monitor gets its own clone.
#[derive(Clone, Debug)]
pub struct ProgressSender {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSender {
    /// A sender that discards every event and never reports closure.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    /// Deliver an event. Returns false if the receiver is gone.
    pub fn emit(&self, event: ProgressEvent) -> bool {
        match &self.tx {
            Some(tx) => tx.send(event).is_ok(),
            None => true,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.is_closed())
    }

    /// Resolves once the receiver has been dropped. Pends forever for a
    /// discarding sender.
    pub async fn closed(&self) {
        match &self.tx {
            Some(tx) => tx.closed().await,
            None => std::future::pending().await,
        }
    }
}

/// Receiving half. Yields events until every sender is dropped.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressReceiver {
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Take whatever is queued right now without waiting.
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            out.push(event);
        }
        out
    }
}

impl Stream for ProgressReceiver {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
