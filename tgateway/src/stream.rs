//! Consumer side of a turn: the outbound event stream and its task handle.

use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{GatewayError, OutboundEvent, TurnReport, WireFrame};

/// Text the consumer has actually been handed, shared with the turn task.
pub(crate) type Delivered = Arc<Mutex<String>>;

pub(crate) fn delivered_text(delivered: &Delivered) -> String {
    delivered
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Outbound events of one turn, in order.
///
/// Once the turn is cancelled the stream ends immediately, even if events
/// are still buffered, so the recorded partial answer matches what was read.
#[derive(Debug)]
pub struct TurnStream {
    rx: mpsc::Receiver<OutboundEvent>,
    cancel: CancellationToken,
    delivered: Delivered,
    done: bool,
}

impl TurnStream {
    pub(crate) fn new(
        rx: mpsc::Receiver<OutboundEvent>,
        cancel: CancellationToken,
        delivered: Delivered,
    ) -> Self {
        Self {
            rx,
            cancel,
            delivered,
            done: false,
        }
    }
}

impl Stream for TurnStream {
    type Item = OutboundEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done || self.cancel.is_cancelled() {
            self.done = true;
            return Poll::Ready(None);
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                let delivered = Arc::clone(&self.delivered);
                let mut delivered = delivered.lock().unwrap_or_else(PoisonError::into_inner);
                // The turn reads this buffer after observing the cancel.
                if self.cancel.is_cancelled() {
                    self.done = true;
                    return Poll::Ready(None);
                }
                if let OutboundEvent::TextDelta(text) = &event {
                    delivered.push_str(text);
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Handle to a running turn.
///
/// Dropping the handle (or just its events) reads as a client disconnect:
/// upstream work stops and the partial answer is persisted.
#[derive(Debug)]
pub struct TurnHandle {
    events: TurnStream,
    cancel: CancellationToken,
    task: JoinHandle<TurnReport>,
}

impl TurnHandle {
    pub(crate) fn new(events: TurnStream, cancel: CancellationToken, task: JoinHandle<TurnReport>) -> Self {
        Self {
            events,
            cancel,
            task,
        }
    }

    /// Fires the external stop signal.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A clone of the stop signal, for wiring to a UI stop button.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Discards the remaining events and waits for the turn to settle, side
    /// effects included.
    pub async fn finish(self) -> Result<TurnReport, GatewayError> {
        let Self {
            mut events, task, ..
        } = self;
        while events.next().await.is_some() {}
        drop(events);
        join(task).await
    }

    /// Stops reading as a client that went away would, then waits for the
    /// turn to settle. The turn ends `ClientDisconnected` unless it already
    /// finished producing events.
    pub async fn disconnect(self) -> Result<TurnReport, GatewayError> {
        let Self { events, task, .. } = self;
        drop(events);
        join(task).await
    }

    /// Reads every remaining event, then waits for the turn to settle.
    pub async fn drain(self) -> Result<(Vec<OutboundEvent>, TurnReport), GatewayError> {
        let Self {
            mut events, task, ..
        } = self;
        let mut collected = Vec::new();
        while let Some(event) = events.next().await {
            collected.push(event);
        }
        drop(events);
        let report = join(task).await?;
        Ok((collected, report))
    }

    /// Wire frames for the remaining events.
    pub fn frames(&mut self) -> impl Stream<Item = WireFrame> + '_ {
        (&mut self.events).map(|event| event.encode())
    }
}

impl Stream for TurnHandle {
    type Item = OutboundEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

async fn join(task: JoinHandle<TurnReport>) -> Result<TurnReport, GatewayError> {
    task.await
        .map_err(|error| GatewayError::unclassified(format!("turn task failed: {error}")))
}
