use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use chrono::Utc;
use tokio::time::Instant;

use crate::{
    api::{
        Author, BlogId, ChannelAction, CommentApi, CommentId, Connector, DeleteRequest, Error,
        FeedMessage, LikeRequest, NewComment,
    },
    ChannelEvent, Change, Comment, CommentStore, ComposeState, Composer, ConnState, Draft,
    LiveChannel, Outcome, SyncConfig,
};

/// Something the host should tell the user about
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Notice {
    LoginRequired,
    /// An earlier comment in the same place is still waiting for the server
    StillPending,
    SubmissionFailed(Error),
    /// The server never acknowledged this comment, and does not have it
    SubmissionLost { content: String },
    LikeFailed(Error),
    DeleteFailed(Error),
    ResyncFailed(Error),
}

#[derive(Clone, Debug)]
struct Pending {
    comment: Comment,
    deadline: Instant,
}

/// The comment section of one blog post, as displayed to one user
pub struct CommentSection {
    config: SyncConfig,
    blog: BlogId,
    user: Option<Author>,
    api: Arc<dyn CommentApi>,
    connector: Arc<dyn Connector>,
    channel: Option<LiveChannel>,
    /// Set once the feed was down, so events may have been missed
    feed_lost: bool,
    store: CommentStore,
    composer: Composer,
    liked: HashSet<CommentId>,
    pending: HashMap<CommentId, Pending>,
    notices: VecDeque<Notice>,
}

impl CommentSection {
    pub fn new(
        config: SyncConfig,
        blog: BlogId,
        user: Option<Author>,
        api: Arc<dyn CommentApi>,
        connector: Arc<dyn Connector>,
    ) -> CommentSection {
        CommentSection {
            config,
            blog,
            user,
            api,
            connector,
            channel: None,
            feed_lost: false,
            store: CommentStore::stub(),
            composer: Composer::default(),
            liked: HashSet::new(),
            pending: HashMap::new(),
            notices: VecDeque::new(),
        }
    }

    pub fn blog(&self) -> &BlogId {
        &self.blog
    }

    pub fn user(&self) -> Option<&Author> {
        self.user.as_ref()
    }

    pub fn set_user(&mut self, user: Option<Author>) {
        self.user = user;
        self.liked.clear();
    }

    pub fn store(&self) -> &CommentStore {
        &self.store
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.composer
    }

    pub fn has_liked(&self, id: &CommentId) -> bool {
        self.liked.contains(id)
    }

    pub fn connection_state(&self) -> ConnState {
        self.channel
            .as_ref()
            .map_or(ConnState::Stopped, |c| c.state())
    }

    pub fn is_live(&self) -> bool {
        self.channel.as_ref().map_or(false, |c| c.is_open())
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    /// Opens the live channel and loads the current comments
    pub async fn mount(&mut self) {
        self.open_channel();
        if let Err(err) = self.load().await {
            tracing::warn!(blog = %self.blog, ?err, "initial comment load failed");
            self.notices.push_back(Notice::ResyncFailed(err));
        }
    }

    /// Closes the live channel and forgets everything about the current blog
    pub fn unmount(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        self.feed_lost = false;
        self.store = CommentStore::stub();
        self.composer = Composer::default();
        self.liked.clear();
        self.pending.clear();
    }

    pub async fn switch_blog(&mut self, blog: BlogId) {
        self.unmount();
        self.notices.clear();
        self.blog = blog;
        self.mount().await;
    }

    fn open_channel(&mut self) {
        let url = self.config.channel_url(&self.blog);
        self.channel = Some(LiveChannel::open(
            self.connector.clone(),
            url,
            self.config.retry.clone(),
        ));
    }

    /// Replaces the store with the server's current list
    pub async fn load(&mut self) -> Result<(), Error> {
        let records = self.api.fetch_comments(&self.blog).await?;
        tracing::debug!(blog = %self.blog, num = records.len(), "loaded comments");
        self.store = CommentStore::organize(records);
        Ok(())
    }

    /// Reloads from the server and puts back the submissions still in flight
    pub async fn resync(&mut self) -> Result<(), Error> {
        self.load().await?;
        let pending = std::mem::take(&mut self.pending);
        for (temp_id, p) in pending {
            if self.is_delivered(&p.comment) {
                tracing::debug!(%temp_id, "pending comment found on the server");
                continue;
            }
            if let Outcome::Inserted = self.apply(Change::Insert(p.comment.clone())) {
                self.pending.insert(temp_id, p);
            }
        }
        Ok(())
    }

    fn is_delivered(&self, sent: &Comment) -> bool {
        let parent = sent.parent_id.as_ref();
        let slot: &[Comment] = match parent {
            None => self.store.roots(),
            Some(p) => match self.store.root(p) {
                Some(r) => &r.replies,
                None => return false,
            },
        };
        slot.iter().any(|c| {
            if c.is_optimistic || c.author.username != sent.author.username {
                return false;
            }
            match &c.client_ref {
                Some(r) => sent.client_ref.as_ref() == Some(r),
                // Without a correlation id, only a comment created since the
                // submission can be it
                None => {
                    c.created_at >= sent.created_at && c.content.trim() == sent.content.trim()
                }
            }
        })
    }

    fn apply(&mut self, change: Change) -> Outcome {
        let local_user = self.user.as_ref().map(|u| u.username.as_str());
        let (store, outcome) = self.store.apply(change, local_user);
        self.store = store;
        if let Outcome::Confirmed { temp_id } = &outcome {
            self.pending.remove(temp_id);
        }
        outcome
    }

    fn send_live(&self, action: ChannelAction) -> Result<(), ChannelAction> {
        match &self.channel {
            Some(channel) => channel.send(action),
            None => Err(action),
        }
    }

    fn require_user(&mut self) -> Option<Author> {
        if self.user.is_none() {
            self.notices.push_back(Notice::LoginRequired);
        }
        self.user.clone()
    }

    pub async fn submit_comment(&mut self) {
        let draft = self.composer.comment_draft();
        self.submit(draft).await
    }

    pub async fn submit_reply(&mut self) {
        let draft = self.composer.open_reply_draft();
        self.submit(draft).await
    }

    async fn submit(&mut self, draft: Option<Draft>) {
        let user = match self.require_user() {
            Some(user) => user,
            None => return,
        };
        let draft = match draft {
            Some(draft) => draft,
            None => return,
        };
        if let Some(parent) = &draft.parent_id {
            match self.store.root(parent) {
                None => {
                    tracing::debug!(%parent, "refusing reply to a comment not loaded as a root");
                    return;
                }
                Some(root) if root.is_optimistic => {
                    self.notices.push_back(Notice::StillPending);
                    return;
                }
                Some(_) => (),
            }
        }
        if self
            .store
            .optimistic_by(&user.username, draft.parent_id.as_ref())
            .is_some()
        {
            self.notices.push_back(Notice::StillPending);
            return;
        }
        if !self.composer.begin(&draft) {
            return;
        }

        let comment = Comment::optimistic(user.clone(), draft, Utc::now());
        let temp_id = comment.id.clone();
        self.apply(Change::Insert(comment.clone()));

        let action = ChannelAction::NewComment {
            blog_id: self.blog.clone(),
            author: user.username.clone(),
            content: comment.content.clone(),
            parent_id: comment.parent_id.clone(),
            client_ref: Some(temp_id.clone()),
        };
        match self.send_live(action) {
            Ok(()) => {
                let deadline = Instant::now() + self.config.ack_timeout;
                self.pending
                    .insert(temp_id, Pending { comment, deadline });
            }
            Err(_) => {
                let req = NewComment {
                    blog_id: self.blog.clone(),
                    author: user.username,
                    content: comment.content.clone(),
                    parent_id: comment.parent_id.clone(),
                    client_ref: Some(temp_id.clone()),
                };
                match self.api.post_comment(&req).await {
                    Ok(record) => {
                        let mut confirmed = Comment::from(record);
                        if confirmed.client_ref.is_none() {
                            confirmed.client_ref = Some(temp_id.clone());
                        }
                        let outcome = self.apply(Change::Insert(confirmed));
                        if !matches!(&outcome, Outcome::Confirmed { temp_id: t } if *t == temp_id) {
                            self.apply(Change::Rollback { temp_id });
                        }
                    }
                    Err(err) => {
                        tracing::warn!(?err, "failed posting comment");
                        self.apply(Change::Rollback { temp_id });
                        self.notices.push_back(Notice::SubmissionFailed(err));
                    }
                }
            }
        }
        self.composer.finish();
    }

    pub fn is_submitting(&self) -> bool {
        self.composer.state() == ComposeState::Submitting
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Earliest deadline of a live submission awaiting its acknowledgement
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Deals with live submissions whose acknowledgement did not come in time
    pub async fn check_pending(&mut self, now: Instant) {
        let expired: Vec<CommentId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        if expired.is_empty() {
            return;
        }
        let expired: Vec<Pending> = expired
            .into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .collect();
        tracing::info!(
            num = expired.len(),
            "comments not acknowledged in time, resyncing"
        );
        if let Err(err) = self.resync().await {
            tracing::warn!(?err, "resync after acknowledgement timeout failed");
            self.notices.push_back(Notice::ResyncFailed(err));
            let deadline = now + self.config.ack_timeout;
            for mut p in expired {
                p.deadline = deadline;
                self.pending.insert(p.comment.id.clone(), p);
            }
            return;
        }
        for p in expired {
            if !self.is_delivered(&p.comment) {
                let content = &p.comment.content;
                tracing::warn!(%content, "comment lost on its way to the server");
                self.notices.push_back(Notice::SubmissionLost {
                    content: p.comment.content,
                });
            }
        }
    }

    pub async fn toggle_like(&mut self, id: &CommentId) {
        let user = match self.require_user() {
            Some(user) => user,
            None => return,
        };
        let parent_id = match self.store.get(id) {
            None => return,
            Some(c) if c.is_optimistic => return,
            Some(c) => c.parent_id.clone(),
        };
        let liking = !self.liked.contains(id);
        let delta = if liking { 1 } else { -1 };
        if liking {
            self.liked.insert(id.clone());
        } else {
            self.liked.remove(id);
        }
        self.apply(Change::AdjustLikes {
            id: id.clone(),
            parent_id: parent_id.clone(),
            delta,
        });

        let action = ChannelAction::LikeComment {
            blog_id: self.blog.clone(),
            username: user.username.clone(),
            comment_id: id.clone(),
        };
        if self.send_live(action).is_ok() {
            return;
        }
        let req = LikeRequest {
            username: user.username,
        };
        match self.api.like_comment(id, &req).await {
            Ok(resp) => {
                if let Some(likes) = resp.likes {
                    self.apply(Change::SetLikes {
                        id: id.clone(),
                        parent_id,
                        likes,
                    });
                }
            }
            Err(err) => {
                tracing::warn!(%id, ?err, "failed liking comment");
                self.apply(Change::AdjustLikes {
                    id: id.clone(),
                    parent_id,
                    delta: -delta,
                });
                if liking {
                    self.liked.remove(id);
                } else {
                    self.liked.insert(id.clone());
                }
                self.notices.push_back(Notice::LikeFailed(err));
            }
        }
    }

    pub async fn delete(&mut self, id: &CommentId) {
        let user = match self.require_user() {
            Some(user) => user,
            None => return,
        };
        let (parent_id, optimistic) = match self.store.get(id) {
            None => return,
            Some(c) => (c.parent_id.clone(), c.is_optimistic),
        };
        self.apply(Change::Delete {
            id: id.clone(),
            parent_id,
        });
        self.prune_pending();
        if optimistic {
            return;
        }

        let action = ChannelAction::DeleteComment {
            blog_id: self.blog.clone(),
            username: user.username.clone(),
            comment_id: id.clone(),
        };
        if self.send_live(action).is_ok() {
            return;
        }
        let req = DeleteRequest {
            username: user.username,
        };
        if let Err(err) = self.api.delete_comment(id, &req).await {
            tracing::warn!(%id, ?err, "failed deleting comment, resyncing");
            self.notices.push_back(Notice::DeleteFailed(err));
            if let Err(err) = self.resync().await {
                self.notices.push_back(Notice::ResyncFailed(err));
            }
        }
    }

    fn prune_pending(&mut self) {
        let store = &self.store;
        self.pending.retain(|temp_id, _| store.get(temp_id).is_some());
    }

    pub fn handle_feed_message(&mut self, msg: FeedMessage) -> Outcome {
        match Change::from_feed(msg) {
            Some(change) => {
                let outcome = self.apply(change);
                if outcome == Outcome::Removed {
                    self.prune_pending();
                }
                outcome
            }
            None => Outcome::Unchanged,
        }
    }

    /// Next event of the live channel, waiting forever if there is no channel
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        match &mut self.channel {
            Some(channel) => channel.next_event().await,
            None => futures::future::pending::<Option<ChannelEvent>>().await,
        }
    }

    pub async fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message(msg) => {
                let outcome = self.handle_feed_message(msg);
                tracing::trace!(?outcome, "applied feed message");
            }
            ChannelEvent::Connected => {
                if self.feed_lost {
                    tracing::info!(blog = %self.blog, "comment feed back, resyncing");
                    if let Err(err) = self.resync().await {
                        self.notices.push_back(Notice::ResyncFailed(err));
                    }
                    self.feed_lost = false;
                }
            }
            ChannelEvent::Disconnected => {
                tracing::debug!(blog = %self.blog, "comment feed lost");
                self.feed_lost = true;
            }
        }
    }

    /// Handles every event the live channel already delivered
    pub async fn process_events(&mut self) -> usize {
        let mut num = 0;
        loop {
            let event = match &mut self.channel {
                Some(channel) => channel.try_next_event(),
                None => None,
            };
            match event {
                Some(event) => {
                    self.handle_event(event).await;
                    num += 1;
                }
                None => return num,
            }
        }
    }
}
