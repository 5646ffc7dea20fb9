//! Bounded outbound channel with cancellation and disconnect detection.

use std::time::Duration;

use futures_core::Stream;
use futures_timer::Delay;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::OutboundEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The external stop signal fired.
    StopRequested,
    /// The consumer dropped the event stream.
    ClientDisconnected,
}

/// Producer side of a turn's event stream.
///
/// Every await point here also resolves when the turn is cancelled or the
/// consumer goes away, so upstream work stops promptly.
#[derive(Debug, Clone)]
pub(crate) struct OutboundSink {
    tx: mpsc::Sender<OutboundEvent>,
    cancel: CancellationToken,
}

impl OutboundSink {
    pub(crate) fn new(tx: mpsc::Sender<OutboundEvent>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    pub(crate) async fn send(&self, event: OutboundEvent) -> Result<(), CancelReason> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CancelReason::StopRequested),
            sent = self.tx.send(event) => sent.map_err(|_| CancelReason::ClientDisconnected),
        }
    }

    /// Sends a terminal event if anyone is still listening.
    pub(crate) async fn send_final(&self, event: OutboundEvent) {
        if self.check().is_ok() {
            let _ = self.send(event).await;
        }
    }

    pub(crate) async fn interrupted(&self) -> CancelReason {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => CancelReason::StopRequested,
            _ = self.tx.closed() => CancelReason::ClientDisconnected,
        }
    }

    pub(crate) fn check(&self) -> Result<(), CancelReason> {
        if self.cancel.is_cancelled() {
            Err(CancelReason::StopRequested)
        } else if self.tx.is_closed() {
            Err(CancelReason::ClientDisconnected)
        } else {
            Ok(())
        }
    }

    pub(crate) async fn pause(&self, delay: Duration) -> Result<(), CancelReason> {
        if delay.is_zero() {
            return self.check();
        }

        tokio::select! {
            reason = self.interrupted() => Err(reason),
            _ = Delay::new(delay) => Ok(()),
        }
    }

    /// Races a single upstream future against cancellation.
    pub(crate) async fn race<F>(&self, future: F) -> Result<F::Output, CancelReason>
    where
        F: std::future::Future,
    {
        tokio::select! {
            biased;
            reason = self.interrupted() => Err(reason),
            output = future => Ok(output),
        }
    }

    /// Wraps an upstream stream so that it ends with `Err` as soon as the
    /// turn is interrupted, without polling the source any further.
    pub(crate) fn guard<'a, S>(
        &'a self,
        mut source: S,
    ) -> impl Stream<Item = Result<S::Item, CancelReason>> + Send + 'a
    where
        S: Stream + Unpin + Send + 'a,
        S::Item: Send,
    {
        async_stream::stream! {
            loop {
                let next = tokio::select! {
                    biased;
                    reason = self.interrupted() => Err(reason),
                    item = source.next() => Ok(item),
                };

                match next {
                    Ok(Some(item)) => yield Ok(item),
                    Ok(None) => break,
                    Err(reason) => {
                        yield Err(reason);
                        break;
                    }
                }
            }
        }
    }
}
