//! Typed access to the key-value store plus key and timestamp conventions.

use chrono::SecondsFormat;
use serde::{de::DeserializeOwned, Serialize};

use crate::kv::{KvStore, StoreError};

pub const USER: &str = "user";
pub const EVENT: &str = "event";
pub const INSTRUCTION: &str = "instruction";
pub const GROUP: &str = "group";

/// Store key for a record. Accepts either a bare id or an already prefixed
/// key, so `abc` and `event:abc` address the same event.
pub fn record_key(kind: &str, id: &str) -> String {
    match id.strip_prefix(kind).and_then(|rest| rest.strip_prefix(':')) {
        Some(_) => id.to_string(),
        None => format!("{}:{}", kind, id),
    }
}

/// Bare id from a route parameter that may carry the key prefix.
pub fn bare_id<'a>(kind: &str, id: &'a str) -> &'a str {
    id.strip_prefix(kind)
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(id)
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Fixed-width RFC 3339 UTC timestamp; string order is time order.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub async fn load<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

pub async fn save<T: Serialize>(store: &dyn KvStore, key: &str, record: &T) -> Result<(), StoreError> {
    store.set(key, serde_json::to_value(record)?).await
}

/// Every record under `prefix`. Records that no longer match the schema are
/// logged and skipped rather than failing the whole listing.
pub async fn load_all<T: DeserializeOwned>(
    store: &dyn KvStore,
    prefix: &str,
) -> Result<Vec<T>, StoreError> {
    let values = store.get_by_prefix(prefix).await?;
    let mut records = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value(value) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("Skipping unreadable record under {}: {}", prefix, e),
        }
    }
    Ok(records)
}
