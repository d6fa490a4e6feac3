//! Elasticsearch/OpenSearch REST client.
//!
//! Implements [`SearchClient`] with the scroll API for reads and the bulk API
//! for writes. Targets Elasticsearch 7+ and OpenSearch (typeless documents).

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::warn;

use crate::client::common::{
    create_http_client, error_reason, handle_http_error, handle_search_error, join_url,
    validate_url,
};
use crate::client::{IndexDefinition, ScrollPage, SearchClient};
use crate::config::ClusterConfig;
use crate::document::{BulkOutcome, Document, DocumentWriteError};
use crate::error::{Error, Result};
use crate::retry::{with_retry, RetryConfig};

/// Credentials attached to every request.
#[derive(Clone)]
enum Auth {
    Anonymous,
    Basic {
        username: String,
        password: Option<String>,
    },
    ApiKey(String),
}

// Secrets stay out of logs
impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::ApiKey(_) => f.write_str("ApiKey(..)"),
        }
    }
}

/// Response of a search or scroll request.
#[derive(Debug, Deserialize)]
struct ScrollResponse {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    #[serde(rename = "_shards", default)]
    shards: Option<ShardStats>,
    hits: HitsContainer,
}

#[derive(Debug, Deserialize)]
struct ShardStats {
    total: u64,
    successful: u64,
    #[serde(default)]
    skipped: u64,
}

#[derive(Debug, Deserialize)]
struct HitsContainer {
    #[serde(default)]
    hits: Vec<Document>,
}

/// Response of a bulk request.
#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// Elasticsearch/OpenSearch client.
///
/// Cheap to share: the underlying `reqwest::Client` pools connections and
/// is safe for concurrent use by all writer workers.
#[derive(Debug, Clone)]
pub struct ElasticsearchClient {
    base_url: String,
    auth: Auth,
    client: Client,
    retry: RetryConfig,
}

impl ElasticsearchClient {
    /// Creates a client for one cluster.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unusable base URL and
    /// [`Error::Connection`] if the HTTP client cannot be built.
    pub fn new(config: &ClusterConfig) -> Result<Self> {
        let base_url = config.base_url();
        validate_url(&base_url)?;

        let auth = if let Some(api_key) = &config.api_key {
            Auth::ApiKey(api_key.clone())
        } else if let Some(username) = &config.username {
            Auth::Basic {
                username: username.clone(),
                password: config.password.clone(),
            }
        } else {
            Auth::Anonymous
        };

        Ok(Self {
            base_url,
            auth,
            client: create_http_client(config.timeout())?,
            retry: RetryConfig::with_max_retries(config.max_retries),
        })
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::Anonymous => req,
            Auth::Basic { username, password } => req.basic_auth(username, password.as_ref()),
            Auth::ApiKey(key) => req.header("Authorization", format!("ApiKey {}", key)),
        }
    }

    /// Sends a request, retrying transient failures.
    ///
    /// Throttling and gateway statuses are turned into errors so the retry
    /// layer sees them; every other status is left to the caller.
    async fn request<F>(&self, operation: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let build = &build;
        with_retry(&self.retry, operation, || async move {
            let response = self.authorize(build()).send().await?;
            let status = response.status().as_u16();
            if matches!(status, 429 | 502 | 503 | 504) {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Status {
                    status,
                    reason: error_reason(&body),
                });
            }
            Ok(response)
        })
        .await
    }

    fn parse_scroll_page(response: ScrollResponse) -> Result<ScrollPage> {
        if let Some(shards) = &response.shards {
            if shards.successful + shards.skipped < shards.total {
                return Err(Error::ShardFailure {
                    successful: shards.successful,
                    total: shards.total,
                });
            }
        }

        Ok(ScrollPage {
            scroll_id: response.scroll_id,
            documents: response.hits.hits,
        })
    }

    fn parse_bulk_response(
        documents: &[Document],
        response: BulkResponse,
    ) -> Result<Vec<BulkOutcome>> {
        if response.items.len() != documents.len() {
            return Err(Error::Response(format!(
                "bulk response has {} items for {} documents",
                response.items.len(),
                documents.len()
            )));
        }

        let outcomes = documents
            .iter()
            .zip(response.items)
            .map(|(doc, item)| {
                let Some(item) = item.into_values().next() else {
                    return BulkOutcome::Failed(DocumentWriteError {
                        id: doc.id.clone(),
                        status: 0,
                        error_type: "empty_bulk_item".to_string(),
                        reason: "bulk response item carried no action".to_string(),
                    });
                };

                match item.error {
                    None if (200..300).contains(&item.status) => {
                        BulkOutcome::Indexed { id: doc.id.clone() }
                    }
                    error => BulkOutcome::Failed(write_error(&doc.id, item.status, error)),
                }
            })
            .collect();

        Ok(outcomes)
    }
}

/// Builds the NDJSON body of a bulk request: one `index` action line and one
/// source line per document, newline terminated.
///
/// # Errors
///
/// Returns [`Error::Response`] if a payload cannot be serialized.
pub fn encode_bulk_body(documents: &[Document]) -> Result<String> {
    let mut body = String::new();

    for doc in documents {
        let mut action = serde_json::Map::new();
        action.insert("_index".to_string(), Value::String(doc.index.clone()));
        action.insert("_id".to_string(), Value::String(doc.id.clone()));
        if let Some(routing) = &doc.routing {
            action.insert("routing".to_string(), Value::String(routing.clone()));
        }

        let action_line = serde_json::to_string(&json!({ "index": action }))
            .map_err(|e| Error::Response(format!("Failed to encode bulk action: {}", e)))?;
        let source_line = serde_json::to_string(&doc.source).map_err(|e| {
            Error::Response(format!("Failed to encode document '{}': {}", doc.id, e))
        })?;

        body.push_str(&action_line);
        body.push('\n');
        body.push_str(&source_line);
        body.push('\n');
    }

    Ok(body)
}

fn write_error(id: &str, status: u16, error: Option<Value>) -> DocumentWriteError {
    let (error_type, reason) = match error {
        Some(Value::Object(map)) => (
            map.get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            map.get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        Some(Value::String(reason)) => ("unknown".to_string(), reason),
        Some(other) => ("unknown".to_string(), other.to_string()),
        None => ("unknown".to_string(), format!("unexpected item status {}", status)),
    };

    DocumentWriteError {
        id: id.to_string(),
        status,
        error_type,
        reason,
    }
}

async fn ensure_success<F>(response: Response, on_error: F) -> Result<Response>
where
    F: FnOnce(u16, &str) -> Error,
{
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(on_error(status, &body))
}

async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::Response(format!("Failed to parse {} response: {}", what, e)))
}

#[async_trait]
impl SearchClient for ElasticsearchClient {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn open_scroll(&self, index: &str, body: &Value, keep_alive: &str) -> Result<ScrollPage> {
        let url = self.url(&format!("{}/_search", index));
        let response = self
            .request("open scroll", || {
                self.client
                    .post(&url)
                    .query(&[("scroll", keep_alive)])
                    .json(body)
            })
            .await?;
        let response = ensure_success(response, |status, text| {
            handle_search_error(status, text, &self.base_url, index)
        })
        .await?;

        let response: ScrollResponse = read_json(response, "search").await?;
        let scroll_id = response.scroll_id.clone();
        let page = Self::parse_scroll_page(response);

        // The caller never sees the cursor of a rejected first page
        if let (Err(_), Some(scroll_id)) = (&page, scroll_id) {
            if let Err(e) = self.clear_scroll(&scroll_id).await {
                warn!("Failed to clear scroll after shard failure: {}", e);
            }
        }
        page
    }

    async fn next_scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<ScrollPage> {
        let url = self.url("_search/scroll");
        let body = json!({ "scroll": keep_alive, "scroll_id": scroll_id });
        let response = self
            .request("scroll", || self.client.post(&url).json(&body))
            .await?;
        let response = ensure_success(response, |status, text| {
            handle_http_error(status, text, &self.base_url)
        })
        .await?;

        Self::parse_scroll_page(read_json(response, "scroll").await?)
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        let url = self.url("_search/scroll");
        let body = json!({ "scroll_id": [scroll_id] });
        let response = self
            .request("clear scroll", || self.client.delete(&url).json(&body))
            .await?;

        // 404: the cursor already expired
        if response.status().as_u16() == 404 {
            return Ok(());
        }
        ensure_success(response, |status, text| {
            handle_http_error(status, text, &self.base_url)
        })
        .await?;
        Ok(())
    }

    async fn bulk(&self, documents: &[Document]) -> Result<Vec<BulkOutcome>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.url("_bulk");
        let body = encode_bulk_body(documents)?;
        let response = self
            .request("bulk", || {
                self.client
                    .post(&url)
                    .header("Content-Type", "application/x-ndjson")
                    .body(body.clone())
            })
            .await?;
        let response = ensure_success(response, |status, text| {
            handle_http_error(status, text, &self.base_url)
        })
        .await?;

        let bulk: BulkResponse = read_json(response, "bulk").await?;
        if bulk.errors {
            tracing::debug!("{}: bulk request reported item errors", self.base_url);
        }
        Self::parse_bulk_response(documents, bulk)
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let url = self.url(index);
        let response = self
            .request("index exists", || self.client.head(&url))
            .await?;

        match response.status().as_u16() {
            404 => Ok(false),
            status if (200..300).contains(&status) => Ok(true),
            status => Err(handle_http_error(status, "", &self.base_url)),
        }
    }

    async fn get_index_definition(&self, index: &str) -> Result<IndexDefinition> {
        let url = self.url(index);
        let response = self
            .request("get index", || self.client.get(&url))
            .await?;
        let response = ensure_success(response, |status, text| match status {
            404 => Error::IndexNotFound(index.to_string()),
            _ => handle_http_error(status, text, &self.base_url),
        })
        .await?;

        // Keyed by concrete index name, which differs from `index` for aliases
        let definitions: HashMap<String, IndexDefinition> = read_json(response, "get index").await?;
        definitions
            .into_values()
            .next()
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))
    }

    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> Result<()> {
        let url = self.url(index);
        let response = self
            .request("create index", || self.client.put(&url).json(definition))
            .await?;
        ensure_success(response, |status, text| {
            handle_http_error(status, text, &self.base_url)
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "elasticsearch_tests.rs"]
mod tests;
