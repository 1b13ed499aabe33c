use anyhow::Context;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::api::{Connector, FeedSocket};

/// Connects to the real server over websockets
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> anyhow::Result<FeedSocket> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .with_context(|| format!("opening websocket to {url}"))?;
        let (sink, stream) = ws.split();
        let sink = sink
            .with(|text: String| async move { Ok::<_, tungstenite::Error>(Message::Text(text)) })
            .sink_map_err(anyhow::Error::from);
        let stream = stream.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => Some(Ok(text)),
                    Err(err) => {
                        tracing::warn!(?err, "dropping non-utf8 binary frame");
                        None
                    }
                },
                // pings are answered by tungstenite, and the stream ends after a close frame
                Ok(_) => None,
                Err(err) => Some(Err(anyhow::Error::from(err))),
            }
        });
        Ok(FeedSocket {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}
