use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};

use crate::{BlogId, CommentId, CommentRecord};

/// Message pushed by the server on a blog's live channel
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FeedMessage {
    NewComment {
        comment: CommentRecord,
    },
    UpdateComment {
        comment: CommentRecord,
    },
    DeleteComment {
        comment_id: CommentId,
        #[serde(default)]
        parent_id: Option<CommentId>,
    },
}

/// Message sent by the client on a blog's live channel
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChannelAction {
    NewComment {
        blog_id: BlogId,
        author: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<CommentId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_ref: Option<CommentId>,
    },
    LikeComment {
        blog_id: BlogId,
        username: String,
        comment_id: CommentId,
    },
    DeleteComment {
        blog_id: BlogId,
        username: String,
        comment_id: CommentId,
    },
}

pub type SocketSink = Pin<Box<dyn Sink<String, Error = anyhow::Error> + Send>>;
pub type SocketStream = Pin<Box<dyn Stream<Item = anyhow::Result<String>> + Send>>;

/// One open live channel connection, as text frames in both directions
pub struct FeedSocket {
    pub sink: SocketSink,
    pub stream: SocketStream,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> anyhow::Result<FeedSocket>;
}
