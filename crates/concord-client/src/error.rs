use concord_remote::RemoteError;
use concord_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("local cache error: {0}")]
    Store(#[from] StoreError),

    #[error("remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("malformed row: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("local cache lock poisoned")]
    CachePoisoned,
}

pub type Result<T> = std::result::Result<T, ClientError>;
