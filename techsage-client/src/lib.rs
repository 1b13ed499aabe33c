mod comment;
pub use comment::Comment;

mod compose;
pub use compose::{ComposeState, Composer, Draft};

mod reconcile;
pub use reconcile::{Change, Outcome};

mod store;
pub use store::CommentStore;

#[cfg(test)]
mod test_util;

pub mod api {
    pub use techsage_api::*;
}
