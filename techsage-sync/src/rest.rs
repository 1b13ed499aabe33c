use async_trait::async_trait;

use crate::{
    api::{
        BlogId, CommentApi, CommentId, CommentList, CommentRecord, CreatedComment, DeleteRequest,
        Error, LikeRequest, LikeResponse, NewComment,
    },
    SyncConfig,
};

/// `CommentApi` over the server's REST endpoints
#[derive(Clone, Debug)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
}

fn network(err: reqwest::Error) -> Error {
    Error::Network(err.to_string())
}

impl RestClient {
    pub fn new(config: &SyncConfig) -> RestClient {
        RestClient {
            client: reqwest::Client::new(),
            base_url: config.rest_base(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn body(resp: reqwest::Response) -> Result<Vec<u8>, Error> {
        let status = resp.status();
        let body = resp.bytes().await.map_err(network)?;
        if !status.is_success() {
            let err = Error::from_response(status.as_u16(), &body);
            tracing::debug!(%status, ?err, "server rejected request");
            return Err(err);
        }
        Ok(body.to_vec())
    }

    async fn json<T>(resp: reqwest::Response) -> Result<T, Error>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let body = RestClient::body(resp).await?;
        serde_json::from_slice(&body).map_err(|e| Error::Decode(e.to_string()))
    }
}

#[async_trait]
impl CommentApi for RestClient {
    async fn fetch_comments(&self, blog: &BlogId) -> Result<Vec<CommentRecord>, Error> {
        let resp = self
            .client
            .get(self.url(&format!("/comments/blog/{}/", blog)))
            .send()
            .await
            .map_err(network)?;
        let list: CommentList = RestClient::json(resp).await?;
        Ok(list.into_records())
    }

    async fn post_comment(&self, c: &NewComment) -> Result<CommentRecord, Error> {
        c.validate()?;
        let resp = self
            .client
            .post(self.url("/comments/post/"))
            .json(c)
            .send()
            .await
            .map_err(network)?;
        let created: CreatedComment = RestClient::json(resp).await?;
        Ok(created.into_record())
    }

    async fn like_comment(
        &self,
        id: &CommentId,
        req: &LikeRequest,
    ) -> Result<LikeResponse, Error> {
        let resp = self
            .client
            .post(self.url(&format!("/comments/{}/like/", id)))
            .json(req)
            .send()
            .await
            .map_err(network)?;
        let body = RestClient::body(resp).await?;
        if body.is_empty() {
            return Ok(LikeResponse::default());
        }
        serde_json::from_slice(&body).map_err(|e| Error::Decode(e.to_string()))
    }

    async fn delete_comment(&self, id: &CommentId, req: &DeleteRequest) -> Result<(), Error> {
        let resp = self
            .client
            .delete(self.url(&format!("/comments/{}/delete/", id)))
            .json(req)
            .send()
            .await
            .map_err(network)?;
        RestClient::body(resp).await?;
        Ok(())
    }
}
