use crate::api::CommentId;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ComposeState {
    Idle,
    Submitting,
}

/// Text ready for submission, and where it goes
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Draft {
    pub content: String,
    pub parent_id: Option<CommentId>,
}

/// Input state of a comment section: the root comment form, and the one reply
/// form that may be open
#[derive(Clone, Debug)]
pub struct Composer {
    state: ComposeState,
    reply_to: Option<CommentId>,
    draft: String,
    reply_draft: String,
}

impl Default for Composer {
    fn default() -> Composer {
        Composer {
            state: ComposeState::Idle,
            reply_to: None,
            draft: String::new(),
            reply_draft: String::new(),
        }
    }
}

impl Composer {
    pub fn state(&self) -> ComposeState {
        self.state
    }

    pub fn reply_to(&self) -> Option<&CommentId> {
        self.reply_to.as_ref()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn reply_draft(&self) -> &str {
        &self.reply_draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn set_reply_draft(&mut self, text: impl Into<String>) {
        self.reply_draft = text.into();
    }

    /// Opens the reply form under `root`, or closes it if it already was open
    /// there
    pub fn toggle_reply(&mut self, root: CommentId) {
        if self.reply_to.as_ref() == Some(&root) {
            self.reply_to = None;
        } else {
            self.reply_to = Some(root);
        }
    }

    pub fn cancel_reply(&mut self) {
        self.reply_to = None;
    }

    /// What submitting the root form would send, if there is anything to send
    pub fn comment_draft(&self) -> Option<Draft> {
        let content = self.draft.trim();
        (!content.is_empty()).then(|| Draft {
            content: String::from(content),
            parent_id: None,
        })
    }

    /// What submitting the open reply form would send, if there is anything
    /// to send
    pub fn open_reply_draft(&self) -> Option<Draft> {
        let parent = self.reply_to.clone()?;
        let content = self.reply_draft.trim();
        (!content.is_empty()).then(|| Draft {
            content: String::from(content),
            parent_id: Some(parent),
        })
    }

    /// Moves to `Submitting` and clears the input `draft` came from. Returns
    /// false if a submission is already running
    pub fn begin(&mut self, draft: &Draft) -> bool {
        if self.state == ComposeState::Submitting {
            return false;
        }
        self.state = ComposeState::Submitting;
        match draft.parent_id {
            None => self.draft.clear(),
            Some(_) => {
                self.reply_draft.clear();
                self.reply_to = None;
            }
        }
        true
    }

    pub fn finish(&mut self) {
        self.state = ComposeState::Idle;
    }
}
