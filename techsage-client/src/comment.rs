use chrono::Duration;

use crate::{
    api::{Author, CommentId, CommentRecord, Time},
    Draft,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Comment {
    pub id: CommentId,

    /// Root comment this is a reply to, if any
    pub parent_id: Option<CommentId>,

    pub author: Author,
    pub content: String,
    pub created_at: Time,
    pub like_count: u32,

    /// Set while the server has not confirmed this comment yet
    pub is_optimistic: bool,

    /// Temporary id of the local submission that produced this comment
    pub client_ref: Option<CommentId>,

    /// Replies, newest first. Always empty for replies themselves
    pub replies: Vec<Comment>,
}

impl From<CommentRecord> for Comment {
    fn from(r: CommentRecord) -> Comment {
        Comment {
            id: r.id,
            parent_id: r.parent,
            author: r.author,
            content: r.content,
            created_at: r.created_at,
            like_count: r.likes.unwrap_or(0),
            is_optimistic: false,
            client_ref: r.client_ref,
            replies: Vec::new(),
        }
    }
}

impl Comment {
    pub fn optimistic(author: Author, draft: Draft, now: Time) -> Comment {
        let id = CommentId::temporary();
        Comment {
            client_ref: Some(id.clone()),
            id,
            parent_id: draft.parent_id,
            author,
            content: draft.content,
            created_at: now,
            like_count: 0,
            is_optimistic: true,
            replies: Vec::new(),
        }
    }

    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn sort_key(&self) -> i64 {
        self.created_at.timestamp_millis()
    }

    /// Key that stays the same across re-renders of the same comment
    pub fn render_key(&self) -> String {
        format!("{}-{}", self.id, self.sort_key())
    }

    pub fn age_label(&self, now: Time) -> String {
        let age = now - self.created_at;
        if self.is_optimistic || age < Duration::minutes(1) {
            return String::from("Just now");
        }
        let (n, unit) = if age < Duration::hours(1) {
            (age.num_minutes(), "minute")
        } else if age < Duration::days(1) {
            (age.num_hours(), "hour")
        } else {
            (age.num_days(), "day")
        };
        match n {
            1 => format!("1 {unit} ago"),
            n => format!("{n} {unit}s ago"),
        }
    }
}

pub fn sort_newest_first(comments: &mut [Comment]) {
    comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

pub fn is_newest_first(comments: &[Comment]) -> bool {
    comments
        .windows(2)
        .all(|w| w[0].created_at >= w[1].created_at)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn comment_at(minute: u32) -> Comment {
        Comment {
            id: CommentId(format!("c{minute}")),
            parent_id: None,
            author: Author::named("ada"),
            content: String::from("hi"),
            created_at: Utc.with_ymd_and_hms(2024, 6, 4, 10, minute, 0).unwrap(),
            like_count: 0,
            is_optimistic: false,
            client_ref: None,
            replies: Vec::new(),
        }
    }

    #[test]
    fn sorting_is_newest_first_and_stable() {
        let mut c = vec![comment_at(1), comment_at(5), comment_at(3), comment_at(5)];
        c[3].id = CommentId(String::from("c5bis"));
        sort_newest_first(&mut c);
        let ids = c.iter().map(|c| c.id.0.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["c5", "c5bis", "c3", "c1"]);
        assert!(is_newest_first(&c));
    }

    #[test]
    fn render_key_combines_id_and_time() {
        let c = comment_at(0);
        let millis = c.created_at.timestamp_millis();
        assert_eq!(c.render_key(), format!("c0-{millis}"));
    }

    #[test]
    fn age_labels() {
        let c = comment_at(0);
        let at = |h, m| Utc.with_ymd_and_hms(2024, 6, 4, h, m, 0).unwrap();
        assert_eq!(c.age_label(at(10, 0)), "Just now");
        assert_eq!(c.age_label(at(10, 1)), "1 minute ago");
        assert_eq!(c.age_label(at(10, 42)), "42 minutes ago");
        assert_eq!(c.age_label(at(13, 0)), "3 hours ago");
        assert_eq!(
            c.age_label(Utc.with_ymd_and_hms(2024, 6, 6, 10, 0, 0).unwrap()),
            "2 days ago"
        );
    }

    #[test]
    fn optimistic_comments_carry_their_own_ref() {
        let now = Utc.with_ymd_and_hms(2024, 6, 4, 10, 5, 0).unwrap();
        let draft = Draft {
            content: String::from("hello"),
            parent_id: None,
        };
        let c = Comment::optimistic(Author::named("ada"), draft, now);
        assert!(c.is_optimistic);
        assert!(c.id.is_temporary());
        assert_eq!(c.client_ref.as_ref(), Some(&c.id));
        assert_eq!(c.age_label(now + Duration::hours(2)), "Just now");
    }
}
