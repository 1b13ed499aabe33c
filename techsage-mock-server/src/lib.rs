use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::{channel::mpsc, SinkExt, StreamExt};
use parking_lot::Mutex;
use techsage_api::{
    Author, BlogId, ChannelAction, CommentApi, CommentId, CommentRecord, Connector,
    DeleteRequest, Error, FeedMessage, FeedSocket, LikeRequest, LikeResponse, NewComment, Time,
};

/// In-memory comment server, serving both the REST api and live channels
#[derive(Clone, Default)]
pub struct MockServer(Arc<Mutex<State>>);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Reader,
    Moderator,
}

#[derive(Default)]
struct State {
    users: HashMap<String, Role>,
    blogs: BTreeMap<BlogId, Vec<Stored>>,
    feeds: HashMap<BlogId, Vec<mpsc::UnboundedSender<String>>>,
    next_id: u64,
    clock: Option<Time>,
    connects: usize,
    failures: Failures,
    drop_socket_actions: bool,
    strip_client_ref: bool,
}

#[derive(Default)]
struct Failures {
    fetch: usize,
    post: usize,
    like: usize,
    delete: usize,
    connect: usize,
}

#[derive(Debug)]
struct Stored {
    record: CommentRecord,
    likers: BTreeSet<String>,
}

fn injected() -> Error {
    Error::Network(String::from("injected failure"))
}

fn take_failure(count: &mut usize) -> bool {
    if *count == 0 {
        return false;
    }
    *count -= 1;
    true
}

impl State {
    fn tick(&mut self) -> Time {
        let wall = Utc::now();
        let now = match self.clock {
            Some(t) if t >= wall => t + Duration::seconds(1),
            _ => wall,
        };
        self.clock = Some(now);
        now
    }

    fn comments_mut(&mut self, blog: &BlogId) -> Result<&mut Vec<Stored>, Error> {
        self.blogs
            .get_mut(blog)
            .ok_or_else(|| Error::NotFound(format!("blog {blog}")))
    }

    fn find_mut(&mut self, id: &CommentId) -> Result<(BlogId, &mut Stored), Error> {
        for (blog, comments) in self.blogs.iter_mut() {
            if let Some(c) = comments.iter_mut().find(|c| c.record.id == *id) {
                return Ok((blog.clone(), c));
            }
        }
        Err(Error::NotFound(format!("comment {id}")))
    }

    fn create(&mut self, c: &NewComment) -> Result<CommentRecord, Error> {
        c.validate()?;
        if !self.users.contains_key(&c.author) {
            return Err(Error::NotFound(format!("user {}", c.author)));
        }
        let created_at = self.tick();
        self.next_id += 1;
        let id = CommentId(self.next_id.to_string());
        let strip_client_ref = self.strip_client_ref;
        let comments = self.comments_mut(&c.blog_id)?;
        if let Some(p) = &c.parent_id {
            if !comments.iter().any(|s| s.record.id == *p && !s.record.is_deleted) {
                return Err(Error::NotFound(format!("comment {p}")));
            }
        }
        let record = CommentRecord {
            id,
            blog: Some(c.blog_id.clone()),
            author: Author::named(c.author.clone()),
            content: c.content.clone(),
            parent: c.parent_id.clone(),
            created_at,
            updated_at: None,
            likes: Some(0),
            dislikes: Some(0),
            is_deleted: false,
            is_reviewed: false,
            client_ref: if strip_client_ref {
                None
            } else {
                c.client_ref.clone()
            },
        };
        comments.push(Stored {
            record: record.clone(),
            likers: BTreeSet::new(),
        });
        Ok(record)
    }

    fn like(&mut self, id: &CommentId, username: &str) -> Result<(BlogId, CommentRecord), Error> {
        if !self.users.contains_key(username) {
            return Err(Error::NotFound(format!("user {username}")));
        }
        let (blog, c) = self.find_mut(id)?;
        if c.record.is_deleted {
            return Err(Error::NotFound(format!("comment {id}")));
        }
        if !c.likers.remove(username) {
            c.likers.insert(String::from(username));
        }
        c.record.likes = Some(c.likers.len() as u32);
        Ok((blog, c.record.clone()))
    }

    fn delete(&mut self, id: &CommentId, username: &str) -> Result<(BlogId, CommentRecord), Error> {
        let role = self.users.get(username).copied();
        let (blog, c) = self.find_mut(id)?;
        if c.record.is_deleted {
            return Err(Error::NotFound(format!("comment {id}")));
        }
        let allowed = c.record.author.username == username || role == Some(Role::Moderator);
        if !allowed {
            return Err(Error::PermissionDenied);
        }
        c.record.is_deleted = true;
        Ok((blog, c.record.clone()))
    }

    fn broadcast(&mut self, blog: &BlogId, msg: &FeedMessage) {
        let text = match serde_json::to_string(msg) {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(?err, "failed serializing feed message");
                return;
            }
        };
        if let Some(feeds) = self.feeds.get_mut(blog) {
            feeds.retain(|f| f.unbounded_send(text.clone()).is_ok());
        }
    }

    // Errors are not reported back on the live channel, the action is just lost
    fn handle_socket_action(&mut self, blog: &BlogId, action: ChannelAction) -> Result<(), Error> {
        match action {
            ChannelAction::NewComment {
                blog_id,
                author,
                content,
                parent_id,
                client_ref,
            } => {
                let record = self.create(&NewComment {
                    blog_id,
                    author,
                    content,
                    parent_id,
                    client_ref,
                })?;
                let target = record.blog.clone().unwrap_or_else(|| blog.clone());
                self.broadcast(&target, &FeedMessage::NewComment { comment: record });
            }
            ChannelAction::LikeComment {
                username,
                comment_id,
                ..
            } => {
                let (target, record) = self.like(&comment_id, &username)?;
                self.broadcast(&target, &FeedMessage::UpdateComment { comment: record });
            }
            ChannelAction::DeleteComment {
                username,
                comment_id,
                ..
            } => {
                let (target, record) = self.delete(&comment_id, &username)?;
                self.broadcast(
                    &target,
                    &FeedMessage::DeleteComment {
                        comment_id: record.id,
                        parent_id: record.parent,
                    },
                );
            }
        }
        Ok(())
    }
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer::default()
    }

    pub fn add_user(&self, name: &str, role: Role) {
        self.0.lock().users.insert(String::from(name), role);
    }

    pub fn add_blog(&self, blog: &BlogId) {
        self.0.lock().blogs.entry(blog.clone()).or_default();
    }

    /// Stores a comment without telling any live channel about it
    pub fn seed_comment(
        &self,
        blog: &BlogId,
        author: &str,
        content: &str,
        parent: Option<&CommentId>,
    ) -> Result<CommentId, Error> {
        let mut s = self.0.lock();
        let record = s.create(&NewComment {
            blog_id: blog.clone(),
            author: String::from(author),
            content: String::from(content),
            parent_id: parent.cloned(),
            client_ref: None,
        })?;
        Ok(record.id)
    }

    /// Stores a comment and pushes it to the blog's live channels, as if
    /// `author` had sent it from another browser
    pub fn post_live(
        &self,
        blog: &BlogId,
        author: &str,
        content: &str,
        parent: Option<&CommentId>,
    ) -> Result<CommentId, Error> {
        let mut s = self.0.lock();
        let record = s.create(&NewComment {
            blog_id: blog.clone(),
            author: String::from(author),
            content: String::from(content),
            parent_id: parent.cloned(),
            client_ref: None,
        })?;
        let id = record.id.clone();
        s.broadcast(blog, &FeedMessage::NewComment { comment: record });
        Ok(id)
    }

    /// Pushes a raw text frame to every live channel of `blog`
    pub fn push_raw(&self, blog: &BlogId, text: &str) {
        let mut s = self.0.lock();
        if let Some(feeds) = s.feeds.get_mut(blog) {
            feeds.retain(|f| f.unbounded_send(String::from(text)).is_ok());
        }
    }

    /// Every comment of `blog`, deleted ones included, oldest first
    pub fn test_comments(&self, blog: &BlogId) -> Vec<CommentRecord> {
        let s = self.0.lock();
        s.blogs
            .get(blog)
            .map(|c| c.iter().map(|s| s.record.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of successful live channel connections so far
    pub fn test_num_connects(&self) -> usize {
        self.0.lock().connects
    }

    /// Number of live channels currently connected to `blog`
    pub fn test_num_open_feeds(&self, blog: &BlogId) -> usize {
        let mut s = self.0.lock();
        match s.feeds.get_mut(blog) {
            Some(feeds) => {
                feeds.retain(|f| !f.is_closed());
                feeds.len()
            }
            None => 0,
        }
    }

    /// Closes every live channel from the server side
    pub fn close_feeds(&self) {
        self.0.lock().feeds.clear();
    }

    pub fn fail_next_fetches(&self, n: usize) {
        self.0.lock().failures.fetch = n;
    }

    pub fn fail_next_posts(&self, n: usize) {
        self.0.lock().failures.post = n;
    }

    pub fn fail_next_likes(&self, n: usize) {
        self.0.lock().failures.like = n;
    }

    pub fn fail_next_deletes(&self, n: usize) {
        self.0.lock().failures.delete = n;
    }

    pub fn fail_next_connects(&self, n: usize) {
        self.0.lock().failures.connect = n;
    }

    /// Silently ignore whatever clients send on live channels
    pub fn set_drop_socket_actions(&self, drop: bool) {
        self.0.lock().drop_socket_actions = drop;
    }

    /// Behave like a server that does not echo correlation ids
    pub fn set_strip_client_ref(&self, strip: bool) {
        self.0.lock().strip_client_ref = strip;
    }

    fn handle_socket_text(&self, blog: &BlogId, text: &str) {
        let mut s = self.0.lock();
        if s.drop_socket_actions {
            tracing::debug!(%blog, %text, "dropping socket action");
            return;
        }
        let action: ChannelAction = match serde_json::from_str(text) {
            Ok(a) => a,
            Err(err) => {
                tracing::warn!(%blog, ?err, %text, "ignoring malformed socket action");
                return;
            }
        };
        if let Err(err) = s.handle_socket_action(blog, action) {
            tracing::debug!(%blog, ?err, "socket action failed");
        }
    }
}

#[async_trait]
impl CommentApi for MockServer {
    async fn fetch_comments(&self, blog: &BlogId) -> Result<Vec<CommentRecord>, Error> {
        let mut s = self.0.lock();
        if take_failure(&mut s.failures.fetch) {
            return Err(injected());
        }
        let comments = s.comments_mut(blog)?;
        Ok(comments
            .iter()
            .filter(|c| !c.record.is_deleted)
            .map(|c| c.record.clone())
            .collect())
    }

    async fn post_comment(&self, c: &NewComment) -> Result<CommentRecord, Error> {
        let mut s = self.0.lock();
        if take_failure(&mut s.failures.post) {
            return Err(injected());
        }
        s.create(c)
    }

    async fn like_comment(
        &self,
        id: &CommentId,
        req: &LikeRequest,
    ) -> Result<LikeResponse, Error> {
        let mut s = self.0.lock();
        if take_failure(&mut s.failures.like) {
            return Err(injected());
        }
        let (_, record) = s.like(id, &req.username)?;
        Ok(LikeResponse {
            success: true,
            likes: record.likes,
            dislikes: record.dislikes,
        })
    }

    async fn delete_comment(&self, id: &CommentId, req: &DeleteRequest) -> Result<(), Error> {
        let mut s = self.0.lock();
        if take_failure(&mut s.failures.delete) {
            return Err(injected());
        }
        s.delete(id, &req.username)?;
        Ok(())
    }
}

fn blog_from_url(url: &str) -> Option<BlogId> {
    let (_, rest) = url.split_once("/ws/comments/")?;
    let blog = rest.trim_end_matches('/');
    if blog.is_empty() || blog.contains('/') {
        return None;
    }
    Some(BlogId(String::from(blog)))
}

#[async_trait]
impl Connector for MockServer {
    async fn connect(&self, url: &str) -> anyhow::Result<FeedSocket> {
        let blog = blog_from_url(url).ok_or_else(|| anyhow::anyhow!("not a feed url: {url}"))?;
        let (to_client, from_server) = mpsc::unbounded::<String>();
        let (to_server, mut from_client) = mpsc::unbounded::<String>();
        {
            let mut s = self.0.lock();
            if take_failure(&mut s.failures.connect) {
                anyhow::bail!("connection to {url} refused");
            }
            s.connects += 1;
            s.feeds.entry(blog.clone()).or_default().push(to_client);
        }
        let server = self.clone();
        tokio::spawn(async move {
            while let Some(text) = from_client.next().await {
                server.handle_socket_text(&blog, &text);
            }
        });
        Ok(FeedSocket {
            sink: Box::pin(to_server.sink_map_err(anyhow::Error::from)),
            stream: Box::pin(from_server.map(Ok::<String, anyhow::Error>)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (MockServer, BlogId) {
        let server = MockServer::new();
        let blog = BlogId(String::from("b1"));
        server.add_blog(&blog);
        server.add_user("ada", Role::Reader);
        server.add_user("bob", Role::Reader);
        server.add_user("mod", Role::Moderator);
        (server, blog)
    }

    #[tokio::test]
    async fn likes_toggle_per_user() {
        let (server, blog) = setup();
        let id = server.seed_comment(&blog, "ada", "hi", None).unwrap();
        let like = |u: &str| LikeRequest {
            username: String::from(u),
        };
        let resp = server.like_comment(&id, &like("bob")).await.unwrap();
        assert_eq!(resp.likes, Some(1));
        let resp = server.like_comment(&id, &like("ada")).await.unwrap();
        assert_eq!(resp.likes, Some(2));
        let resp = server.like_comment(&id, &like("bob")).await.unwrap();
        assert_eq!(resp.likes, Some(1));
    }

    #[tokio::test]
    async fn only_author_or_moderator_deletes() {
        let (server, blog) = setup();
        let id = server.seed_comment(&blog, "ada", "hi", None).unwrap();
        let del = |u: &str| DeleteRequest {
            username: String::from(u),
        };
        assert_eq!(
            server.delete_comment(&id, &del("bob")).await,
            Err(Error::PermissionDenied)
        );
        server.delete_comment(&id, &del("mod")).await.unwrap();
        assert!(server.fetch_comments(&blog).await.unwrap().is_empty());
        assert_eq!(server.test_comments(&blog).len(), 1);
    }

    #[tokio::test]
    async fn posting_checks_references() {
        let (server, blog) = setup();
        let mut c = NewComment {
            blog_id: blog.clone(),
            author: String::from("nobody"),
            content: String::from("hi"),
            parent_id: None,
            client_ref: None,
        };
        assert!(matches!(
            server.post_comment(&c).await,
            Err(Error::NotFound(_))
        ));
        c.author = String::from("ada");
        c.parent_id = Some(CommentId(String::from("404")));
        assert!(matches!(
            server.post_comment(&c).await,
            Err(Error::NotFound(_))
        ));
        c.parent_id = None;
        c.content = String::from("  ");
        assert_eq!(server.post_comment(&c).await, Err(Error::EmptyContent));
    }

    #[tokio::test]
    async fn socket_actions_are_broadcast() {
        let (server, blog) = setup();
        let url = "ws://mock/ws/comments/b1/";
        let mut alice = server.connect(url).await.unwrap();
        let mut other = server.connect(url).await.unwrap();
        assert_eq!(server.test_num_connects(), 2);

        let action = ChannelAction::NewComment {
            blog_id: blog.clone(),
            author: String::from("ada"),
            content: String::from("hello"),
            parent_id: None,
            client_ref: Some(CommentId(String::from("temp-1"))),
        };
        alice
            .sink
            .send(serde_json::to_string(&action).unwrap())
            .await
            .unwrap();
        for socket in [&mut alice, &mut other] {
            let text = socket.stream.next().await.unwrap().unwrap();
            match serde_json::from_str::<FeedMessage>(&text).unwrap() {
                FeedMessage::NewComment { comment } => {
                    assert_eq!(comment.content, "hello");
                    assert_eq!(comment.client_ref, Some(CommentId(String::from("temp-1"))));
                }
                msg => panic!("unexpected message {msg:?}"),
            }
        }

        server.close_feeds();
        assert!(alice.stream.next().await.is_none());
        assert_eq!(server.test_num_open_feeds(&blog), 0);
    }

    #[test]
    fn feed_url_names_the_blog() {
        assert_eq!(
            blog_from_url("wss://h:1/ws/comments/abc/"),
            Some(BlogId(String::from("abc")))
        );
        assert_eq!(blog_from_url("wss://h:1/ws/other/abc/"), None);
    }
}
