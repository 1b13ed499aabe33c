use chrono::{TimeZone, Utc};

use crate::{
    api::{Author, CommentId, CommentRecord, Time},
    Comment,
};

pub fn at(minute: u32) -> Time {
    Utc.with_ymd_and_hms(2024, 6, 4, 10, minute, 0).unwrap()
}

pub fn id(s: &str) -> CommentId {
    CommentId(String::from(s))
}

pub fn record(id: &str, parent: Option<&str>, minute: u32) -> CommentRecord {
    CommentRecord {
        id: CommentId(String::from(id)),
        blog: None,
        author: Author::named("ada"),
        content: format!("comment {id}"),
        parent: parent.map(|p| CommentId(String::from(p))),
        created_at: at(minute),
        updated_at: None,
        likes: Some(1),
        dislikes: None,
        is_deleted: false,
        is_reviewed: false,
        client_ref: None,
    }
}

pub fn confirmed(
    id: &str,
    parent: Option<&str>,
    author: &str,
    content: &str,
    minute: u32,
) -> Comment {
    let mut r = record(id, parent, minute);
    r.author = Author::named(author);
    r.content = String::from(content);
    r.likes = Some(0);
    Comment::from(r)
}
