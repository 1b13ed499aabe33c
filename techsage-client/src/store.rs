use std::{collections::HashMap, sync::Arc};

use crate::{
    api::{CommentId, CommentRecord},
    comment::{is_newest_first, sort_newest_first},
    Comment,
};

/// Comment tree of one blog post: root comments, each with one level of
/// replies, both levels newest first
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommentStore {
    roots: Arc<Vec<Comment>>,
}

impl CommentStore {
    pub fn stub() -> CommentStore {
        CommentStore::default()
    }

    /// Rebuilds the whole tree out of the flat list the server returns
    pub fn organize(records: Vec<CommentRecord>) -> CommentStore {
        let records = records
            .into_iter()
            .filter(|r| !r.is_deleted)
            .collect::<Vec<_>>();
        let parents = records
            .iter()
            .map(|r| (r.id.clone(), r.parent.clone()))
            .collect::<HashMap<_, _>>();

        let mut roots = Vec::new();
        let mut replies = Vec::new();
        for r in records {
            match r.parent.clone() {
                None => roots.push(Comment::from(r)),
                Some(p) => match root_of(&parents, &p) {
                    Some(root) => {
                        let mut c = Comment::from(r);
                        c.parent_id = Some(root);
                        replies.push(c);
                    }
                    None => tracing::debug!(id = ?r.id, parent = ?p, "dropping orphan reply"),
                },
            }
        }

        let positions = roots
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect::<HashMap<_, _>>();
        for c in replies {
            if let Some(&i) = c.parent_id.as_ref().and_then(|p| positions.get(p)) {
                roots[i].replies.push(c);
            }
        }
        sort_newest_first(&mut roots);
        for r in roots.iter_mut() {
            sort_newest_first(&mut r.replies);
        }

        CommentStore {
            roots: Arc::new(roots),
        }
    }

    pub fn roots(&self) -> &[Comment] {
        &self.roots
    }

    pub fn root(&self, id: &CommentId) -> Option<&Comment> {
        self.roots.iter().find(|c| c.id == *id)
    }

    pub fn get(&self, id: &CommentId) -> Option<&Comment> {
        self.iter().find(|c| c.id == *id)
    }

    /// All comments, each root followed by its replies
    pub fn iter(&self) -> impl Iterator<Item = &Comment> {
        self.roots
            .iter()
            .flat_map(|r| std::iter::once(r).chain(r.replies.iter()))
    }

    pub fn len(&self) -> usize {
        self.roots.iter().map(|r| 1 + r.replies.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        is_newest_first(&self.roots) && self.roots.iter().all(|r| is_newest_first(&r.replies))
    }

    /// Unconfirmed comment by `username` waiting in the root list
    /// (`parent == None`) or in the replies of `parent`
    pub fn optimistic_by(&self, username: &str, parent: Option<&CommentId>) -> Option<&Comment> {
        let slot: &[Comment] = match parent {
            None => &self.roots,
            Some(p) => &self.root(p)?.replies,
        };
        slot.iter()
            .find(|c| c.is_optimistic && c.author.username == username)
    }

    /// Returns (index of the parent root if `id` is a reply, index in its list)
    pub(crate) fn locate(
        &self,
        id: &CommentId,
        parent: Option<&CommentId>,
    ) -> Option<(Option<usize>, usize)> {
        if let Some(p) = parent {
            if let Some(ri) = self.roots.iter().position(|r| r.id == *p) {
                if let Some(i) = self.roots[ri].replies.iter().position(|c| c.id == *id) {
                    return Some((Some(ri), i));
                }
            }
        }
        if let Some(i) = self.roots.iter().position(|c| c.id == *id) {
            return Some((None, i));
        }
        for (ri, r) in self.roots.iter().enumerate() {
            if let Some(i) = r.replies.iter().position(|c| c.id == *id) {
                return Some((Some(ri), i));
            }
        }
        None
    }

    pub(crate) fn slot_mut(&mut self, root: Option<usize>) -> &mut Vec<Comment> {
        let roots = Arc::make_mut(&mut self.roots);
        match root {
            None => roots,
            Some(ri) => &mut roots[ri].replies,
        }
    }
}

// Replies to replies get attached to the root of their thread
fn root_of(parents: &HashMap<CommentId, Option<CommentId>>, id: &CommentId) -> Option<CommentId> {
    let mut cur = id;
    for _ in 0..parents.len() {
        match parents.get(cur)? {
            None => return Some(cur.clone()),
            Some(p) => cur = p,
        }
    }
    tracing::warn!(?id, "comment parent chain loops");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::record;

    fn ids(c: &[Comment]) -> Vec<&str> {
        c.iter().map(|c| c.id.0.as_str()).collect()
    }

    #[test]
    fn organize_partitions_and_sorts() {
        let store = CommentStore::organize(vec![
            record("a", None, 0),
            record("b", None, 5),
            record("a1", Some("a"), 1),
            record("a2", Some("a"), 3),
            record("b1", Some("b"), 6),
        ]);
        assert_eq!(ids(store.roots()), ["b", "a"]);
        let a = store.root(&CommentId(String::from("a"))).unwrap();
        assert_eq!(ids(&a.replies), ["a2", "a1"]);
        assert_eq!(store.len(), 5);
        assert!(store.is_sorted());
    }

    #[test]
    fn organize_flattens_deep_replies() {
        let store = CommentStore::organize(vec![
            record("a", None, 0),
            record("a1", Some("a"), 1),
            record("a1x", Some("a1"), 2),
        ]);
        let a = store.root(&CommentId(String::from("a"))).unwrap();
        assert_eq!(ids(&a.replies), ["a1x", "a1"]);
        assert_eq!(a.replies[0].parent_id, Some(CommentId(String::from("a"))));
    }

    #[test]
    fn organize_drops_orphans_and_deleted() {
        let mut deleted = record("d", None, 4);
        deleted.is_deleted = true;
        let store = CommentStore::organize(vec![
            record("a", None, 0),
            record("z1", Some("z"), 1),
            deleted,
            record("d1", Some("d"), 5),
        ]);
        assert_eq!(ids(store.roots()), ["a"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn organize_survives_parent_loops() {
        let store = CommentStore::organize(vec![
            record("x", Some("y"), 0),
            record("y", Some("x"), 1),
        ]);
        assert!(store.is_empty());
    }

    #[test]
    fn locate_finds_replies_without_parent_hint() {
        let store = CommentStore::organize(vec![
            record("a", None, 0),
            record("b", None, 5),
            record("a1", Some("a"), 1),
        ]);
        let id = |s: &str| CommentId(String::from(s));
        assert_eq!(store.locate(&id("a1"), None), Some((Some(1), 0)));
        assert_eq!(store.locate(&id("b"), None), Some((None, 0)));
        assert_eq!(store.locate(&id("nope"), None), None);
    }
}
