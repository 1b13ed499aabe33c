use anyhow::{anyhow, Context};

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Permission denied")]
    PermissionDenied,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed decoding server response: {0}")]
    Decode(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Comment content is empty")]
    EmptyContent,
}

impl Error {
    pub fn status_code(&self) -> u16 {
        match self {
            Error::PermissionDenied => 403,
            Error::Unauthenticated => 401,
            Error::NotFound(_) => 404,
            Error::Rejected { status, .. } => *status,
            Error::Network(_) => 503,
            Error::Decode(_) => 502,
            Error::NullByteInString(_) => 400,
            Error::EmptyContent => 400,
        }
    }

    /// Builds the error matching a non-success response
    pub fn from_response(status: u16, body: &[u8]) -> Error {
        let message = match Error::parse_message(body) {
            Ok(msg) => msg,
            Err(err) => {
                tracing::debug!(?err, "error response has no parseable message");
                String::from_utf8_lossy(body).into_owned()
            }
        };
        match status {
            401 => Error::Unauthenticated,
            403 => Error::PermissionDenied,
            404 => Error::NotFound(message),
            status => Error::Rejected { status, message },
        }
    }

    fn parse_message(body: &[u8]) -> anyhow::Result<String> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        data.get("error")
            .or_else(|| data.get("message"))
            .or_else(|| data.get("detail"))
            .and_then(|msg| msg.as_str())
            .map(String::from)
            .ok_or_else(|| anyhow!("error contents has no message"))
    }
}
