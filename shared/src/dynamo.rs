use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::{types::AttributeValue, Client as DynamoClient};
use serde_json::Value;

use crate::kv::{KvStore, StoreError};
use crate::records;

/// DynamoDB-backed store.
///
/// Layout: PK=KV#<segment before the first ':'>, SK=<full key>, and the
/// JSON text in `data`. Every prefix the service scans shares its first
/// segment with the keys it matches, so a prefix scan is a single-partition
/// query with `begins_with(SK, prefix)`.
pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

fn partition_key(key: &str) -> String {
    let segment = key.split(':').next().unwrap_or(key);
    format!("KV#{}", segment)
}

fn encode_item(key: &str, value: &Value) -> Result<HashMap<String, AttributeValue>, StoreError> {
    let mut item = HashMap::new();
    item.insert("PK".to_string(), AttributeValue::S(partition_key(key)));
    item.insert("SK".to_string(), AttributeValue::S(key.to_string()));
    item.insert("data".to_string(), AttributeValue::S(serde_json::to_string(value)?));
    item.insert("written_at".to_string(), AttributeValue::S(records::timestamp()));
    Ok(item)
}

fn decode_item(item: &HashMap<String, AttributeValue>) -> Option<Result<Value, serde_json::Error>> {
    item.get("data")
        .and_then(|v| v.as_s().ok())
        .map(|data| serde_json::from_str(data))
}

#[async_trait]
impl KvStore for DynamoStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(partition_key(key)))
            .key("SK", AttributeValue::S(key.to_string()))
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("get_item {} failed: {:?}", key, e)))?;

        match result.item().and_then(decode_item) {
            Some(value) => Ok(Some(value?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(encode_item(key, &value)?))
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("put_item {} failed: {:?}", key, e)))?;

        Ok(())
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Value>, StoreError> {
        let pk = partition_key(prefix);
        let mut values = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let result = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
                .expression_attribute_values(":pk", AttributeValue::S(pk.clone()))
                .expression_attribute_values(":sk_prefix", AttributeValue::S(prefix.to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| {
                    StoreError::Backend(format!("query prefix {} failed: {:?}", prefix, e))
                })?;

            for item in result.items() {
                match decode_item(item) {
                    Some(Ok(value)) => values.push(value),
                    Some(Err(e)) => {
                        let sk = item.get("SK").and_then(|v| v.as_s().ok());
                        tracing::warn!("Skipping corrupt record {:?}: {}", sk, e);
                    }
                    None => {}
                }
            }

            match result.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(values)
    }
}
