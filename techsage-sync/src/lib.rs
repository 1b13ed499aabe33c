mod channel;
pub use channel::{ChannelEvent, ConnState, LiveChannel};

mod config;
pub use config::{RetryPolicy, SyncConfig};

mod rest;
pub use rest::RestClient;

mod section;
pub use section::{CommentSection, Notice};

mod ws;
pub use ws::WsConnector;

pub use techsage_client::{
    api, Change, Comment, CommentStore, ComposeState, Composer, Draft, Outcome,
};
