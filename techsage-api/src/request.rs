use crate::{BlogId, CommentId, CommentRecord, Error};

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub blog_id: BlogId,
    pub author: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CommentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<CommentId>,
}

impl NewComment {
    // See comments on other `validate` functions throughout techsage-api
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.author)?;
        crate::validate_string(&self.content)?;
        if self.content.trim().is_empty() {
            return Err(Error::EmptyContent);
        }
        Ok(())
    }
}

/// Reply to `POST /comments/post/`, either bare or wrapped
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(untagged)]
pub enum CreatedComment {
    Bare(CommentRecord),
    Envelope { comment: CommentRecord },
}

impl CreatedComment {
    pub fn into_record(self) -> CommentRecord {
        match self {
            CreatedComment::Bare(c) | CreatedComment::Envelope { comment: c } => c,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LikeRequest {
    pub username: String,
}

#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize,
)]
pub struct LikeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub likes: Option<u32>,
    #[serde(default)]
    pub dislikes: Option<u32>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DeleteRequest {
    pub username: String,
}
