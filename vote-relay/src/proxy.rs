use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::store::{StoreError, StoredVote, VoteFilter, VoteRecord, VoteStore};

const API_KEY_HEADER: &str = "X-Project-Key";
const DB_PATH: &str = "/api/resource-proxy/db";

/// Vote store backed by the remote resource proxy.
///
/// Every operation is a `POST` of `{collection, operation, ...params}` to
/// `{base}/api/resource-proxy/db`, authenticated with the project key.
pub struct ProxyStore {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    collection: String,
}

#[derive(Serialize)]
struct ProxyRequest<'a, P> {
    collection: &'a str,
    operation: &'a str,
    #[serde(flatten)]
    params: P,
}

#[derive(Serialize)]
struct FindParams<'a> {
    filter: &'a VoteFilter,
    limit: usize,
}

#[derive(Serialize)]
struct InsertParams<'a> {
    document: &'a VoteRecord,
}

#[derive(Deserialize)]
struct ProxyResponse {
    #[serde(default)]
    data: Value,
}

impl ProxyStore {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        collection: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{DB_PATH}", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            collection: collection.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<P: Serialize>(&self, operation: &str, params: P) -> Result<Value, StoreError> {
        let request = ProxyRequest {
            collection: &self.collection,
            operation,
            params,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: ProxyResponse =
            serde_json::from_str(&body).map_err(|err| StoreError::Malformed(err.to_string()))?;
        debug!(operation, collection = %self.collection, "store call succeeded");
        Ok(envelope.data)
    }
}

#[async_trait]
impl VoteStore for ProxyStore {
    async fn insert_one(&self, record: &VoteRecord) -> Result<(), StoreError> {
        self.call("insertOne", InsertParams { document: record })
            .await
            .map(|_| ())
    }

    async fn find(&self, filter: &VoteFilter, limit: usize) -> Result<Vec<StoredVote>, StoreError> {
        let data = self.call("find", FindParams { filter, limit }).await?;
        decode_records(data)
    }
}

/// Decodes the `data` field of a `find` response.
///
/// A missing result set reads as empty and a non-array payload is
/// malformed. Every returned document counts as one vote, whatever shape
/// the rest of it has.
fn decode_records(data: Value) -> Result<Vec<StoredVote>, StoreError> {
    let documents = match data {
        Value::Null => return Ok(Vec::new()),
        Value::Array(documents) => documents,
        other => {
            return Err(StoreError::Malformed(format!(
                "expected an array of records, got {other}"
            )));
        }
    };

    let votes: Vec<StoredVote> = documents.iter().map(StoredVote::from_document).collect();
    let missing = votes.iter().filter(|vote| vote.option_id.is_none()).count();
    if missing > 0 {
        warn!(missing, "vote records without an optionId");
    }
    Ok(votes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn find_request_flattens_params() {
        let filter = VoteFilter::poll("p1");
        let request = ProxyRequest {
            collection: "votes",
            operation: "find",
            params: FindParams {
                filter: &filter,
                limit: 1000,
            },
        };

        assert_eq!(
            serde_json::to_value(&request).expect("encode"),
            json!({
                "collection": "votes",
                "operation": "find",
                "filter": { "pollId": "p1" },
                "limit": 1000
            })
        );
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let store = ProxyStore::new("https://gateway.example/", "key", "votes").expect("client");
        assert_eq!(
            store.endpoint(),
            "https://gateway.example/api/resource-proxy/db"
        );
    }

    #[test]
    fn every_document_is_returned() {
        let data = json!([
            { "_id": "1", "pollId": "p1", "optionId": "b", "timestamp": "2024-05-01T10:00:00Z" },
            { "pollId": "p1", "optionId": "b", "timestamp": 1714557600000u64 },
            { "pollId": "p1", "optionId": "b", "timestamp": { "$date": "2024-05-01T10:00:02Z" } },
            { "pollId": "p1", "optionId": "b" },
            { "pollId": "p1" }
        ]);

        let votes = decode_records(data).expect("decode");
        let options: Vec<Option<&str>> =
            votes.iter().map(|vote| vote.option_id.as_deref()).collect();
        assert_eq!(
            options,
            vec![Some("b"), Some("b"), Some("b"), Some("b"), None]
        );
    }

    #[test]
    fn null_data_is_empty_and_objects_are_malformed() {
        assert!(decode_records(Value::Null).expect("null").is_empty());
        assert!(matches!(
            decode_records(json!({ "pollId": "p1" })),
            Err(StoreError::Malformed(_))
        ));
    }
}
