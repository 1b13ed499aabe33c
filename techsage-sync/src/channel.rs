use std::sync::Arc;

use futures::{
    channel::{mpsc, oneshot},
    SinkExt, StreamExt,
};
use tokio::sync::watch;

use crate::{
    api::{ChannelAction, Connector, FeedMessage},
    RetryPolicy,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnState {
    Connecting,
    Connected,
    Disconnected,
    /// Retries exhausted, or the channel was closed
    Stopped,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Message(FeedMessage),
}

/// Live subscription to one blog's comment feed
///
/// The connection itself lives in a spawned task, which reconnects after
/// `RetryPolicy::delay` whenever the connection drops and stops when the
/// `LiveChannel` is closed or dropped.
pub struct LiveChannel {
    state: watch::Receiver<ConnState>,
    outbound: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    canceller: oneshot::Receiver<()>,
}

impl LiveChannel {
    /// Must be called from within a tokio runtime
    pub fn open(connector: Arc<dyn Connector>, url: String, retry: RetryPolicy) -> LiveChannel {
        let (state_tx, state) = watch::channel(ConnState::Connecting);
        let (outbound, outbound_rx) = mpsc::unbounded();
        let (events_tx, events) = mpsc::unbounded();
        let (cancel, canceller) = oneshot::channel();
        tokio::spawn(run_channel(
            connector,
            url,
            retry,
            state_tx,
            events_tx,
            outbound_rx,
            cancel,
        ));
        LiveChannel {
            state,
            outbound,
            events,
            canceller,
        }
    }

    pub fn state(&self) -> ConnState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnState::Connected
    }

    /// Queue `action` on the open connection, handing it back if there is none
    pub fn send(&self, action: ChannelAction) -> Result<(), ChannelAction> {
        if !self.is_open() {
            return Err(action);
        }
        let text = match serde_json::to_string(&action) {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(?err, ?action, "failed serializing channel action");
                return Err(action);
            }
        };
        self.outbound.unbounded_send(text).map_err(|_| action)
    }

    /// Wait for the next event, `None` once the channel task has stopped
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.next().await
    }

    /// Returns an already-received event without waiting
    pub fn try_next_event(&mut self) -> Option<ChannelEvent> {
        self.events.try_recv().ok()
    }

    pub fn close(mut self) {
        self.canceller.close();
    }
}

async fn run_channel(
    connector: Arc<dyn Connector>,
    url: String,
    retry: RetryPolicy,
    state: watch::Sender<ConnState>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut cancel: oneshot::Sender<()>,
) {
    let mut failures: u32 = 0;
    let mut first_attempt = true;
    'reconnect: loop {
        if first_attempt {
            first_attempt = false;
        } else {
            state.send_replace(ConnState::Disconnected);
            let _ = events.unbounded_send(ChannelEvent::Disconnected);
            while let Ok(text) = outbound.try_recv() {
                tracing::warn!(%url, %text, "dropping action queued on a lost connection");
            }
            failures += 1;
            if !retry.allows(failures) {
                tracing::error!(%url, failures, "giving up on the comment feed");
                state.send_replace(ConnState::Stopped);
                return;
            }
            tokio::select! {
                _ = cancel.cancellation() => {
                    state.send_replace(ConnState::Stopped);
                    return;
                }
                _ = tokio::time::sleep(retry.delay) => (),
            }
        }

        state.send_replace(ConnState::Connecting);
        tracing::debug!(%url, "connecting to the comment feed");
        let connected = tokio::select! {
            _ = cancel.cancellation() => {
                state.send_replace(ConnState::Stopped);
                return;
            }
            res = connector.connect(&url) => res,
        };
        let mut socket = match connected {
            Ok(socket) => socket,
            Err(err) => {
                tracing::warn!(%url, ?err, "failed connecting to the comment feed");
                continue 'reconnect;
            }
        };
        failures = 0;
        state.send_replace(ConnState::Connected);
        let _ = events.unbounded_send(ChannelEvent::Connected);
        tracing::info!(%url, "comment feed connected");

        loop {
            tokio::select! {
                _ = cancel.cancellation() => {
                    if let Err(err) = socket.sink.close().await {
                        tracing::debug!(%url, ?err, "error closing the comment feed");
                    }
                    tracing::info!(%url, "comment feed closed");
                    state.send_replace(ConnState::Stopped);
                    return;
                }
                text = outbound.next() => match text {
                    Some(text) => {
                        if let Err(err) = socket.sink.send(text).await {
                            tracing::warn!(%url, ?err, "failed sending to the comment feed");
                            continue 'reconnect;
                        }
                    }
                    None => {
                        // the handle is gone
                        let _ = socket.sink.close().await;
                        state.send_replace(ConnState::Stopped);
                        return;
                    }
                },
                msg = socket.stream.next() => match msg {
                    None => {
                        tracing::info!(%url, "comment feed closed by the server");
                        continue 'reconnect;
                    }
                    Some(Err(err)) => {
                        tracing::warn!(%url, ?err, "comment feed errored");
                        continue 'reconnect;
                    }
                    Some(Ok(text)) => match serde_json::from_str::<FeedMessage>(&text) {
                        Ok(msg) => {
                            tracing::trace!(%url, ?msg, "received feed message");
                            let _ = events.unbounded_send(ChannelEvent::Message(msg));
                        }
                        Err(err) => {
                            tracing::warn!(%url, ?err, %text, "dropping malformed feed message");
                        }
                    },
                },
            }
        }
    }
}
