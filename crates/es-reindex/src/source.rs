//! Document source stream over a scroll cursor.

use futures::stream::{self, Stream};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::client::SearchClient;
use crate::document::Document;
use crate::error::{Error, Result};

/// Scroll cursor parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Documents fetched per scroll page.
    pub scroll_size: usize,
    /// Cursor lease renewed with every page, e.g. `5m`.
    pub keep_alive: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            scroll_size: 1000,
            keep_alive: "5m".to_string(),
        }
    }
}

/// Builds the search body of a scan.
///
/// `query` is raw JSON: an object with a `query` key is used as the full
/// search body, any other object as the query clause. `None` (or blank)
/// matches every document. `size` and a `_doc` sort are added unless the
/// body already sets them.
///
/// # Errors
///
/// Returns [`Error::Query`] if the query is not a JSON object.
pub fn build_search_body(query: Option<&str>, scroll_size: usize) -> Result<Value> {
    let mut body = match query.map(str::trim).filter(|q| !q.is_empty()) {
        None => json!({ "query": { "match_all": {} } }),
        Some(raw) => {
            let parsed: Value = serde_json::from_str(raw)
                .map_err(|e| Error::Query(format!("query is not valid JSON: {}", e)))?;
            match parsed {
                Value::Object(map) if map.is_empty() => json!({ "query": { "match_all": {} } }),
                Value::Object(map) if map.contains_key("query") => Value::Object(map),
                Value::Object(map) => json!({ "query": map }),
                other => {
                    return Err(Error::Query(format!(
                        "query must be a JSON object, got {}",
                        other
                    )))
                }
            }
        }
    };

    if let Some(fields) = body.as_object_mut() {
        fields.entry("size").or_insert_with(|| json!(scroll_size));
        fields.entry("sort").or_insert_with(|| json!(["_doc"]));
    }
    Ok(body)
}

/// Lazy, finite sequence of documents matching a query.
///
/// Holds at most one scroll page in memory. The cursor is cleared as soon as
/// the sequence ends, whether the index was exhausted or the limit reached.
pub struct DocumentSource {
    client: Arc<dyn SearchClient>,
    keep_alive: String,
    scroll_id: Option<String>,
    buffer: VecDeque<Document>,
    remaining: Option<u64>,
    exhausted: bool,
    yielded: u64,
}

impl std::fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSource")
            .field("endpoint", &self.client.endpoint())
            .field("scroll_id", &self.scroll_id)
            .field("buffered", &self.buffer.len())
            .field("remaining", &self.remaining)
            .field("yielded", &self.yielded)
            .finish()
    }
}

impl DocumentSource {
    /// Opens a scan of `index`.
    ///
    /// The first page is fetched here, so a missing index or a rejected
    /// query fails before any document is handed out. A limit of zero opens
    /// no cursor at all.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] or [`Error::IndexNotFound`] for a bad scan
    /// and transport errors if the source cluster is unreachable.
    pub async fn open(
        client: Arc<dyn SearchClient>,
        index: &str,
        query: Option<&str>,
        options: &ScanOptions,
        limit: Option<u64>,
    ) -> Result<Self> {
        let body = build_search_body(query, options.scroll_size)?;

        let mut source = Self {
            client,
            keep_alive: options.keep_alive.clone(),
            scroll_id: None,
            buffer: VecDeque::new(),
            remaining: limit,
            exhausted: false,
            yielded: 0,
        };

        if limit == Some(0) {
            debug!("Limit is 0, not opening a cursor on '{}'", index);
            source.exhausted = true;
            return Ok(source);
        }

        let page = source
            .client
            .open_scroll(index, &body, &source.keep_alive)
            .await?;
        debug!(
            "Opened scroll on '{}' ({} documents in first page)",
            index,
            page.documents.len()
        );

        source.exhausted = page.documents.is_empty();
        source.scroll_id = page.scroll_id;
        source.buffer = page.documents.into();
        Ok(source)
    }

    /// Number of documents handed out so far.
    #[must_use]
    pub fn yielded(&self) -> u64 {
        self.yielded
    }

    /// Returns the next document, or `None` once the sequence has ended.
    ///
    /// # Errors
    ///
    /// Returns transport errors from fetching the next page, including an
    /// expired cursor lease.
    pub async fn next_document(&mut self) -> Result<Option<Document>> {
        loop {
            if self.remaining == Some(0) {
                self.finish().await;
                return Ok(None);
            }

            if let Some(doc) = self.buffer.pop_front() {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                self.yielded += 1;
                return Ok(Some(doc));
            }

            if self.exhausted {
                self.finish().await;
                return Ok(None);
            }

            let Some(scroll_id) = self.scroll_id.clone() else {
                self.exhausted = true;
                continue;
            };

            let page = match self.client.next_scroll(&scroll_id, &self.keep_alive).await {
                Ok(page) => page,
                Err(e) => {
                    self.finish().await;
                    return Err(e);
                }
            };

            if page.scroll_id.is_some() {
                self.scroll_id = page.scroll_id;
            }
            if page.documents.is_empty() {
                self.exhausted = true;
            } else {
                self.buffer.extend(page.documents);
            }
        }
    }

    /// Converts the source into a stream.
    pub fn into_stream(self) -> impl Stream<Item = Result<Document>> + Send {
        stream::try_unfold(self, |mut source| async move {
            Ok::<_, Error>(source.next_document().await?.map(|doc| (doc, source)))
        })
    }

    async fn finish(&mut self) {
        self.exhausted = true;
        self.buffer.clear();

        if let Some(scroll_id) = self.scroll_id.take() {
            match self.client.clear_scroll(&scroll_id).await {
                Ok(()) => debug!("Cleared scroll after {} documents", self.yielded),
                Err(e) => warn!("Failed to clear scroll cursor: {}", e),
            }
        }
    }
}

impl Drop for DocumentSource {
    fn drop(&mut self) {
        // Abandoned mid-scan (fatal writer error, cancellation): release the
        // cursor instead of waiting for its lease to run out
        let Some(scroll_id) = self.scroll_id.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let client = Arc::clone(&self.client);
            handle.spawn(async move {
                if let Err(e) = client.clear_scroll(&scroll_id).await {
                    warn!("Failed to clear abandoned scroll cursor: {}", e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryClient;
    use futures::TryStreamExt;

    fn seeded(count: usize) -> Arc<MemoryClient> {
        let docs = (0..count).map(|i| Document::new(format!("doc-{}", i), "src", Default::default()));
        Arc::new(MemoryClient::new().with_documents("src", docs))
    }

    fn small_pages() -> ScanOptions {
        ScanOptions {
            scroll_size: 3,
            ..ScanOptions::default()
        }
    }

    #[test]
    fn test_build_search_body_defaults_to_match_all() {
        let body = build_search_body(None, 250).unwrap();

        assert_eq!(body["query"], json!({ "match_all": {} }));
        assert_eq!(body["size"], 250);
        assert_eq!(body["sort"], json!(["_doc"]));
    }

    #[test]
    fn test_build_search_body_wraps_bare_clause() {
        let body = build_search_body(Some(r#"{"term":{"status":"open"}}"#), 10).unwrap();

        assert_eq!(body["query"]["term"]["status"], "open");
    }

    #[test]
    fn test_build_search_body_keeps_full_body() {
        let raw = r#"{"query":{"match_all":{}},"size":5,"_source":["a"]}"#;

        let body = build_search_body(Some(raw), 1000).unwrap();

        assert_eq!(body["size"], 5);
        assert_eq!(body["_source"], json!(["a"]));
    }

    #[test]
    fn test_build_search_body_rejects_malformed_query() {
        assert!(matches!(
            build_search_body(Some("{not json"), 10),
            Err(Error::Query(_))
        ));
        assert!(matches!(
            build_search_body(Some("[1,2]"), 10),
            Err(Error::Query(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_yields_all_documents_across_pages() {
        let client = seeded(10);

        let source = DocumentSource::open(client.clone(), "src", None, &small_pages(), None)
            .await
            .unwrap();
        let docs: Vec<Document> = source.into_stream().try_collect().await.unwrap();

        assert_eq!(docs.len(), 10);
        assert_eq!(docs[0].id, "doc-0");
        assert_eq!(docs[9].id, "doc-9");
        assert_eq!(client.open_scrolls(), 0);
    }

    #[tokio::test]
    async fn test_limit_truncates_and_clears_cursor() {
        let client = seeded(10);

        let source = DocumentSource::open(client.clone(), "src", None, &small_pages(), Some(4))
            .await
            .unwrap();
        let docs: Vec<Document> = source.into_stream().try_collect().await.unwrap();

        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["doc-0", "doc-1", "doc-2", "doc-3"]);
        assert_eq!(client.open_scrolls(), 0);
    }

    #[tokio::test]
    async fn test_zero_limit_never_opens_cursor() {
        let client = seeded(3);

        let mut source = DocumentSource::open(client.clone(), "src", None, &small_pages(), Some(0))
            .await
            .unwrap();

        assert!(source.next_document().await.unwrap().is_none());
        assert_eq!(client.scans_opened(), 0);
    }

    #[tokio::test]
    async fn test_missing_index_fails_on_open() {
        let client = seeded(1);

        let err = DocumentSource::open(client, "missing", None, &small_pages(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::IndexNotFound(_)));
    }

    #[tokio::test]
    async fn test_transport_error_mid_scan_propagates() {
        let client = seeded(6);
        let mut source = DocumentSource::open(client.clone(), "src", None, &small_pages(), None)
            .await
            .unwrap();
        for _ in 0..3 {
            source.next_document().await.unwrap();
        }

        client.set_unreachable(true);
        let err = source.next_document().await.unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Transport);
        assert_eq!(source.yielded(), 3);
    }
}
