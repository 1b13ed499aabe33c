use std::fmt;

use uuid::Uuid;

use crate::{BlogId, Time};

/// Prefix of the ids the client allocates for comments the server did not
/// confirm yet
pub const TEMP_ID_PREFIX: &str = "temp-";

#[derive(
    Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct CommentId(pub String);

impl CommentId {
    pub fn temporary() -> CommentId {
        CommentId(format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4()))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(
    Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize,
)]
#[serde(from = "AuthorRepr")]
pub struct Author {
    pub username: String,
    pub avatar_url: Option<String>,
}

impl Author {
    pub fn named(username: impl Into<String>) -> Author {
        Author {
            username: username.into(),
            avatar_url: None,
        }
    }
}

// The REST endpoints send the full author object, the live channel only sends
// the username
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum AuthorRepr {
    Name(String),
    Full {
        username: String,
        #[serde(default)]
        avatar_url: Option<String>,
    },
}

impl From<AuthorRepr> for Author {
    fn from(a: AuthorRepr) -> Author {
        match a {
            AuthorRepr::Name(username) => Author {
                username,
                avatar_url: None,
            },
            AuthorRepr::Full {
                username,
                avatar_url,
            } => Author {
                username,
                avatar_url,
            },
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentRecord {
    pub id: CommentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blog: Option<BlogId>,
    pub author: Author,
    pub content: String,
    #[serde(default, alias = "parent_id")]
    pub parent: Option<CommentId>,
    #[serde(deserialize_with = "crate::time::deserialize")]
    pub created_at: Time,
    #[serde(
        default,
        deserialize_with = "crate::time::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dislikes: Option<u32>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_reviewed: bool,

    /// Temporary id of the submission this record confirms, for servers that
    /// echo it back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<CommentId>,
}

/// Reply to `GET /comments/blog/{id}/`, either bare or wrapped
///
/// Records are kept undecoded until `into_records`, so that one malformed
/// record does not make the whole list unreadable.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum CommentList {
    Bare(Vec<serde_json::Value>),
    Envelope {
        comments: Vec<serde_json::Value>,
        #[serde(default)]
        count: Option<usize>,
    },
}

impl CommentList {
    /// Decodes every well-formed record, skipping the others
    pub fn into_records(self) -> Vec<CommentRecord> {
        let raw = match self {
            CommentList::Bare(c) => c,
            CommentList::Envelope { comments, count } => {
                if let Some(count) = count {
                    if count != comments.len() {
                        tracing::warn!(
                            count,
                            received = comments.len(),
                            "comment list count does not match its contents"
                        );
                    }
                }
                comments
            }
        };
        raw.into_iter()
            .filter_map(|v| {
                let id = v.get("id").cloned();
                match serde_json::from_value::<CommentRecord>(v) {
                    Ok(r) => Some(r),
                    Err(err) => {
                        tracing::warn!(?id, ?err, "skipping malformed comment record");
                        None
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_from_rest_envelope() {
        let json = r#"{
            "success": true,
            "count": 1,
            "comments": [{
                "id": "665f1c2e9b1e8a0012345678",
                "blog": "665f1c2e9b1e8a0000000001",
                "author": {"username": "ada", "avatar_url": "https://example.org/a.png"},
                "content": "Nice proof",
                "parent": null,
                "created_at": "2024-06-04T10:05:00.123456",
                "updated_at": "2024-06-04T10:05:00.123456",
                "likes": 3,
                "dislikes": 0,
                "is_deleted": false,
                "is_reviewed": false
            }]
        }"#;
        let list: CommentList = serde_json::from_str(json).expect("parsing envelope");
        let records = list.into_records();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.author.username, "ada");
        assert_eq!(
            r.author.avatar_url.as_deref(),
            Some("https://example.org/a.png")
        );
        assert_eq!(r.likes, Some(3));
        assert_eq!(r.parent, None);
        assert_eq!(r.created_at.timestamp_subsec_micros(), 123456);
    }

    #[test]
    fn record_from_live_channel() {
        let json = r#"{
            "id": "42",
            "blog": "7",
            "author": "ada",
            "content": "hello",
            "parent": "41",
            "created_at": "2024-06-04T10:05:00+00:00"
        }"#;
        let r: CommentRecord = serde_json::from_str(json).expect("parsing record");
        assert_eq!(r.author, Author::named("ada"));
        assert_eq!(r.parent, Some(CommentId(String::from("41"))));
        assert_eq!(r.likes, None);
        assert!(!r.is_deleted);
    }

    #[test]
    fn malformed_records_are_skipped() {
        let json = r#"{
            "success": true,
            "count": 2,
            "comments": [
                {"id": "1", "author": "ada", "content": "fine",
                 "created_at": "2024-06-04T10:05:00"},
                {"id": "2", "author": "bob", "content": "broken", "created_at": null}
            ]
        }"#;
        let list: CommentList = serde_json::from_str(json).expect("parsing envelope");
        let records = list.into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, CommentId(String::from("1")));

        let list: CommentList =
            serde_json::from_str(r#"[{"id": "3"}]"#).expect("parsing bare list");
        assert!(list.into_records().is_empty());
    }

    #[test]
    fn bare_comment_list() {
        let list: CommentList = serde_json::from_str("[]").expect("parsing empty list");
        assert!(list.into_records().is_empty());
    }

    #[test]
    fn temporary_ids() {
        let id = CommentId::temporary();
        assert!(id.is_temporary());
        let server_id = CommentId(String::from("665f1c2e9b1e8a0012345678"));
        assert!(!server_id.is_temporary());
    }
}
