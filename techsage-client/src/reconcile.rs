use crate::{
    api::{CommentId, FeedMessage},
    comment::sort_newest_first,
    Comment, CommentStore,
};

/// One modification of a comment store, from the live channel, a REST reply
/// or a local user action
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Change {
    Insert(Comment),
    SetLikes {
        id: CommentId,
        parent_id: Option<CommentId>,
        likes: u32,
    },
    AdjustLikes {
        id: CommentId,
        parent_id: Option<CommentId>,
        delta: i64,
    },
    Delete {
        id: CommentId,
        parent_id: Option<CommentId>,
    },
    /// Removes a comment the server never confirmed
    Rollback { temp_id: CommentId },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Inserted,
    /// The optimistic entry `temp_id` got replaced by its confirmation
    Confirmed { temp_id: CommentId },
    Updated,
    Removed,
    Unchanged,
    /// The change refers to a parent that is not in the store
    Dropped,
}

impl Change {
    pub fn from_feed(msg: FeedMessage) -> Option<Change> {
        match msg {
            FeedMessage::NewComment { comment } if comment.is_deleted => {
                tracing::debug!(id = ?comment.id, "ignoring new comment that is already deleted");
                None
            }
            FeedMessage::NewComment { comment } => Some(Change::Insert(Comment::from(comment))),
            FeedMessage::UpdateComment { comment } => match comment.likes {
                Some(likes) => Some(Change::SetLikes {
                    id: comment.id,
                    parent_id: comment.parent,
                    likes,
                }),
                None => {
                    tracing::warn!(id = ?comment.id, "comment update carries no like count");
                    None
                }
            },
            FeedMessage::DeleteComment {
                comment_id,
                parent_id,
            } => Some(Change::Delete {
                id: comment_id,
                parent_id,
            }),
        }
    }
}

impl CommentStore {
    /// Returns the store with `change` applied. `local_user` is the username
    /// whose optimistic entries confirmations may replace
    pub fn apply(&self, change: Change, local_user: Option<&str>) -> (CommentStore, Outcome) {
        let mut res = self.clone();
        let outcome = match change {
            Change::Insert(c) => res.insert(c, local_user),
            Change::SetLikes {
                id,
                parent_id,
                likes,
            } => res.update_likes(&id, parent_id.as_ref(), |_| likes),
            Change::AdjustLikes {
                id,
                parent_id,
                delta,
            } => res.update_likes(&id, parent_id.as_ref(), |current| {
                (current as i64 + delta).clamp(0, u32::MAX as i64) as u32
            }),
            Change::Delete { id, parent_id } => res.remove(&id, parent_id.as_ref(), false),
            Change::Rollback { temp_id } => res.remove(&temp_id, None, true),
        };
        (res, outcome)
    }

    fn insert(&mut self, mut c: Comment, local_user: Option<&str>) -> Outcome {
        let root = match c.parent_id.clone() {
            None => None,
            Some(p) => match self.locate(&p, None) {
                Some((None, ri)) => Some(ri),
                // Replies to replies go to the thread's root
                Some((Some(ri), _)) => {
                    c.parent_id = Some(self.roots()[ri].id.clone());
                    Some(ri)
                }
                None => {
                    tracing::debug!(id = ?c.id, parent = ?p, "dropping reply to unknown comment");
                    return Outcome::Dropped;
                }
            },
        };
        c.replies.clear();

        let slot: &[Comment] = match root {
            None => self.roots(),
            Some(ri) => &self.roots()[ri].replies,
        };
        if slot.iter().any(|e| e.id == c.id) {
            return Outcome::Unchanged;
        }
        let replaced = match local_user {
            Some(user) if !c.is_optimistic && c.author.username == user => {
                find_optimistic_match(slot, &c)
            }
            _ => None,
        };

        let slot = self.slot_mut(root);
        let outcome = match replaced {
            Some(i) => {
                let temp = slot.remove(i);
                c.replies = temp.replies;
                for r in c.replies.iter_mut() {
                    r.parent_id = Some(c.id.clone());
                }
                Outcome::Confirmed { temp_id: temp.id }
            }
            None => Outcome::Inserted,
        };
        slot.push(c);
        sort_newest_first(slot);
        outcome
    }

    fn update_likes<F>(&mut self, id: &CommentId, parent: Option<&CommentId>, f: F) -> Outcome
    where
        F: FnOnce(u32) -> u32,
    {
        let (root, i) = match self.locate(id, parent) {
            Some(pos) => pos,
            None => {
                tracing::debug!(?id, "like count change for unknown comment");
                return Outcome::Dropped;
            }
        };
        let slot = self.slot_mut(root);
        let new = f(slot[i].like_count);
        if slot[i].like_count == new {
            return Outcome::Unchanged;
        }
        slot[i].like_count = new;
        Outcome::Updated
    }

    fn remove(
        &mut self,
        id: &CommentId,
        parent: Option<&CommentId>,
        only_optimistic: bool,
    ) -> Outcome {
        let (root, i) = match self.locate(id, parent) {
            Some(pos) => pos,
            None => return Outcome::Unchanged,
        };
        let slot: &[Comment] = match root {
            None => self.roots(),
            Some(ri) => &self.roots()[ri].replies,
        };
        if only_optimistic && !slot[i].is_optimistic {
            tracing::warn!(?id, "refusing to roll back a confirmed comment");
            return Outcome::Unchanged;
        }
        self.slot_mut(root).remove(i);
        Outcome::Removed
    }
}

// Optimistic entry by the same author that `c` most likely confirms
fn find_optimistic_match(slot: &[Comment], c: &Comment) -> Option<usize> {
    let candidates = || {
        slot.iter()
            .enumerate()
            .filter(|(_, e)| e.is_optimistic && e.author.username == c.author.username)
    };
    if let Some(r) = &c.client_ref {
        if let Some((i, _)) = candidates().find(|(_, e)| e.id == *r) {
            return Some(i);
        }
    }
    let content = c.content.trim();
    if let Some((i, _)) = candidates().find(|(_, e)| e.content.trim() == content) {
        return Some(i);
    }
    candidates().min_by_key(|(_, e)| e.created_at).map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{Author, CommentRecord},
        test_util::*,
        Draft,
    };

    fn store() -> CommentStore {
        // [A(10:00), B(09:00)]
        let mut b = record("B", None, 0);
        b.created_at = at(0) - chrono::Duration::hours(1);
        CommentStore::organize(vec![record("A", None, 0), b])
    }

    fn optimistic(parent: Option<&str>, content: &str, minute: u32) -> Comment {
        Comment::optimistic(
            Author::named("u"),
            Draft {
                content: String::from(content),
                parent_id: parent.map(id),
            },
            at(minute),
        )
    }

    fn reply_a1() -> Comment {
        confirmed("A1", Some("A"), "v", "x", 1)
    }

    #[test]
    fn reply_confirmation_replaces_optimistic_entry() {
        let s = store();
        let temp = optimistic(Some("A"), "hello", 5);
        let temp_id = temp.id.clone();
        let (s, o) = s.apply(Change::Insert(temp), Some("u"));
        assert_eq!(o, Outcome::Inserted);
        let a = s.root(&id("A")).unwrap();
        assert_eq!(a.replies.len(), 1);
        assert!(a.replies[0].is_optimistic);

        let confirmed = confirmed("42", Some("A"), "u", "hello", 5);
        let (s, o) = s.apply(Change::Insert(confirmed), Some("u"));
        assert_eq!(o, Outcome::Confirmed { temp_id });
        let a = s.root(&id("A")).unwrap();
        assert_eq!(a.replies.len(), 1);
        assert_eq!(a.replies[0].id, id("42"));
        assert!(!a.replies[0].is_optimistic);
        assert_eq!(s.roots()[1].id, id("B"));
    }

    #[test]
    fn confirmation_prefers_correlation_then_content() {
        let first = optimistic(None, "first", 1);
        let second = optimistic(None, "second", 2);
        let (s, _) = CommentStore::stub().apply(Change::Insert(first.clone()), Some("u"));
        let (s, _) = s.apply(Change::Insert(second.clone()), Some("u"));

        let mut by_ref = confirmed("1", None, "u", "edited by server", 2);
        by_ref.client_ref = Some(second.id.clone());
        let (after, o) = s.apply(Change::Insert(by_ref), Some("u"));
        assert_eq!(
            o,
            Outcome::Confirmed {
                temp_id: second.id.clone()
            }
        );
        assert_eq!(after.len(), 2);

        let by_content = confirmed("1", None, "u", " second", 2);
        let (_, o) = s.apply(Change::Insert(by_content), Some("u"));
        assert_eq!(o, Outcome::Confirmed { temp_id: second.id });

        let by_age = confirmed("1", None, "u", "something else", 2);
        let (_, o) = s.apply(Change::Insert(by_age), Some("u"));
        assert_eq!(o, Outcome::Confirmed { temp_id: first.id });
    }

    #[test]
    fn other_users_never_replace_optimistic_entries() {
        let (s, _) = store().apply(Change::Insert(optimistic(None, "hello", 5)), Some("u"));
        let other = confirmed("42", None, "v", "hello", 5);
        let (s, o) = s.apply(Change::Insert(other), Some("u"));
        assert_eq!(o, Outcome::Inserted);
        assert_eq!(s.roots().len(), 4);
    }

    #[test]
    fn echo_of_confirmed_comment_keeps_other_pending_entry() {
        let one = confirmed("42", None, "u", "one", 5);
        let (s, _) = store().apply(Change::Insert(one.clone()), Some("u"));
        let (s, _) = s.apply(Change::Insert(optimistic(None, "two", 6)), Some("u"));
        let (after, o) = s.apply(Change::Insert(one), Some("u"));
        assert_eq!(o, Outcome::Unchanged);
        assert_eq!(after, s);
    }

    #[test]
    fn orphan_reply_is_dropped() {
        let s = store();
        let orphan = confirmed("9", Some("Z"), "v", "x", 3);
        let (after, o) = s.apply(Change::Insert(orphan), None);
        assert_eq!(o, Outcome::Dropped);
        assert_eq!(after, s);
    }

    #[test]
    fn reply_to_reply_lands_in_thread() {
        let (s, _) = store().apply(Change::Insert(reply_a1()), None);
        let nested = confirmed("A1x", Some("A1"), "v", "y", 2);
        let (s, o) = s.apply(Change::Insert(nested), None);
        assert_eq!(o, Outcome::Inserted);
        let a = s.root(&id("A")).unwrap();
        assert_eq!(a.replies[0].id, id("A1x"));
        assert_eq!(a.replies[0].parent_id, Some(id("A")));
    }

    #[test]
    fn likes_update_in_place() {
        let (s, _) = store().apply(Change::Insert(reply_a1()), None);
        let (s, o) = s.apply(
            Change::SetLikes {
                id: id("A1"),
                parent_id: Some(id("A")),
                likes: 7,
            },
            None,
        );
        assert_eq!(o, Outcome::Updated);
        assert_eq!(s.get(&id("A1")).unwrap().like_count, 7);

        let (s, _) = s.apply(
            Change::AdjustLikes {
                id: id("A1"),
                parent_id: None,
                delta: -10,
            },
            None,
        );
        assert_eq!(s.get(&id("A1")).unwrap().like_count, 0);

        let (_, o) = s.apply(
            Change::SetLikes {
                id: id("nope"),
                parent_id: None,
                likes: 1,
            },
            None,
        );
        assert_eq!(o, Outcome::Dropped);
    }

    #[test]
    fn deletes() {
        let (s, _) = store().apply(Change::Insert(reply_a1()), None);
        let (s, o) = s.apply(
            Change::Delete {
                id: id("A1"),
                parent_id: Some(id("A")),
            },
            None,
        );
        assert_eq!(o, Outcome::Removed);
        assert!(s.get(&id("A1")).is_none());

        let (s, o) = s.apply(
            Change::Delete {
                id: id("A"),
                parent_id: None,
            },
            None,
        );
        assert_eq!(o, Outcome::Removed);
        assert_eq!(s.len(), 1);

        let (_, o) = s.apply(
            Change::Delete {
                id: id("A"),
                parent_id: None,
            },
            None,
        );
        assert_eq!(o, Outcome::Unchanged);
    }

    #[test]
    fn rollback_restores_previous_state() {
        let before = store();
        let temp = optimistic(None, "hello", 30);
        let (s, _) = before.apply(Change::Insert(temp.clone()), Some("u"));
        let (after, o) = s.apply(Change::Rollback { temp_id: temp.id }, Some("u"));
        assert_eq!(o, Outcome::Removed);
        assert_eq!(after, before);

        let (same, o) = after.apply(Change::Rollback { temp_id: id("A") }, Some("u"));
        assert_eq!(o, Outcome::Unchanged);
        assert_eq!(same, before);
    }

    #[test]
    fn feed_messages_map_to_changes() {
        let mut r: CommentRecord = record("42", Some("A"), 1);
        r.likes = None;
        let update = FeedMessage::UpdateComment { comment: r.clone() };
        assert_eq!(Change::from_feed(update), None);
        r.likes = Some(2);
        assert_eq!(
            Change::from_feed(FeedMessage::UpdateComment { comment: r.clone() }),
            Some(Change::SetLikes {
                id: id("42"),
                parent_id: Some(id("A")),
                likes: 2,
            })
        );
        r.is_deleted = true;
        let deleted = FeedMessage::NewComment { comment: r };
        assert_eq!(Change::from_feed(deleted), None);
    }

    // Each step is (kind, comment number, parent number, minute, by local user)
    fn build_changes(steps: &[(u8, u8, u8, u8, bool)]) -> Vec<Change> {
        steps
            .iter()
            .map(|&(kind, n, p, minute, local)| {
                let n = n % 8;
                let parent = match p % 3 {
                    0 => None,
                    _ => Some(format!("c{}", p % 8)),
                };
                let author = if local { "u" } else { "v" };
                let minute = (minute % 60) as u32;
                let c = confirmed(&format!("c{n}"), parent.as_deref(), author, "x", minute);
                match kind % 4 {
                    0 | 1 => Change::Insert(c),
                    2 => Change::Insert(optimistic(parent.as_deref(), "x", minute)),
                    _ => Change::Delete {
                        id: c.id,
                        parent_id: c.parent_id,
                    },
                }
            })
            .collect()
    }

    #[test]
    fn fuzz_stays_sorted() {
        bolero::check!()
            .with_type::<Vec<(u8, u8, u8, u8, bool)>>()
            .for_each(|steps| {
                let mut s = CommentStore::stub();
                for c in build_changes(steps) {
                    s = s.apply(c, Some("u")).0;
                    assert!(s.is_sorted());
                    assert!(s.roots().iter().all(|r| !r.is_reply()));
                    let threaded = |r: &Comment| {
                        r.replies.iter().all(|c| c.parent_id.as_ref() == Some(&r.id))
                    };
                    assert!(s.roots().iter().all(threaded));
                }
            })
    }

    #[test]
    fn fuzz_inserts_are_idempotent() {
        bolero::check!()
            .with_type::<(Vec<(u8, u8, u8, u8, bool)>, (u8, u8, u8, bool))>()
            .for_each(|(steps, (n, p, minute, local))| {
                let mut s = CommentStore::stub();
                for c in build_changes(steps) {
                    s = s.apply(c, Some("u")).0;
                }
                let insert = build_changes(&[(0, *n, *p, *minute, *local)]).remove(0);
                let once = s.apply(insert.clone(), Some("u")).0;
                let twice = once.apply(insert, Some("u")).0;
                assert_eq!(once, twice);
            })
    }
}
