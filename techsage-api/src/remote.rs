use async_trait::async_trait;

use crate::{
    BlogId, CommentId, CommentRecord, DeleteRequest, Error, LikeRequest, LikeResponse, NewComment,
};

/// The REST side of the comment service
#[async_trait]
pub trait CommentApi: Send + Sync {
    async fn fetch_comments(&self, blog: &BlogId) -> Result<Vec<CommentRecord>, Error>;
    async fn post_comment(&self, c: &NewComment) -> Result<CommentRecord, Error>;
    async fn like_comment(
        &self,
        id: &CommentId,
        req: &LikeRequest,
    ) -> Result<LikeResponse, Error>;
    async fn delete_comment(&self, id: &CommentId, req: &DeleteRequest) -> Result<(), Error>;
}
