use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Backend(String),
    #[error("record codec: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Key-value store the whole service is built on.
///
/// Keys are `<kind>:<rest>` strings; `get_by_prefix` returns every value
/// whose key starts with `prefix`. No transactions: callers read, modify,
/// then write back.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Value>, StoreError>;
}
