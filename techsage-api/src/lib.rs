use chrono::Utc;

pub type Time = chrono::DateTime<Utc>;

mod blog;
pub use blog::BlogId;

mod comment;
pub use comment::{Author, CommentId, CommentList, CommentRecord, TEMP_ID_PREFIX};

mod error;
pub use error::Error;

mod feed;
pub use feed::{ChannelAction, Connector, FeedMessage, FeedSocket, SocketSink, SocketStream};

mod remote;
pub use remote::CommentApi;

mod request;
pub use request::{CreatedComment, DeleteRequest, LikeRequest, LikeResponse, NewComment};

mod time;
pub use time::parse_time;

// Validation functions are there both for server-side, which must reject
// badly-formed input, and for client-side, which must avoid sending it
pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}
