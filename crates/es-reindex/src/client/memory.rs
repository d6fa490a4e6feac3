//! In-process search cluster.
//!
//! Keeps indices, definitions and scroll cursors behind a mutex and
//! implements [`SearchClient`] over them. Supports `match_all`, `term` and
//! `ids` queries, upsert-by-id bulk writes, and fault injection (per-document
//! rejections, unreachable cluster, bulk failure after N requests).

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::client::{IndexDefinition, ScrollPage, SearchClient};
use crate::document::{BulkOutcome, Document, DocumentWriteError};
use crate::error::{Error, Result};

/// Page size when a search body carries no `size`.
const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Default)]
struct MemoryIndex {
    definition: IndexDefinition,
    documents: Vec<Document>,
}

impl MemoryIndex {
    fn upsert(&mut self, doc: Document) {
        match self.documents.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) => *existing = doc,
            None => self.documents.push(doc),
        }
    }
}

#[derive(Debug)]
struct Cursor {
    remaining: VecDeque<Document>,
    page_size: usize,
}

impl Cursor {
    fn next_page(&mut self) -> Vec<Document> {
        let take = self.page_size.min(self.remaining.len());
        self.remaining.drain(..take).collect()
    }
}

#[derive(Debug, Default)]
struct State {
    indices: BTreeMap<String, MemoryIndex>,
    cursors: HashMap<String, Cursor>,
    next_cursor: u64,
    rejected: HashSet<String>,
    unreachable: bool,
    bulk_budget: Option<usize>,
    scans_opened: usize,
    bulk_requests: usize,
}

impl State {
    fn ensure_reachable(&self) -> Result<()> {
        if self.unreachable {
            return Err(unreachable_error());
        }
        Ok(())
    }
}

fn unreachable_error() -> Error {
    Error::Status {
        status: 503,
        reason: "memory cluster is unreachable".to_string(),
    }
}

/// In-memory [`SearchClient`].
#[derive(Debug)]
pub struct MemoryClient {
    name: String,
    state: Mutex<State>,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClient {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::named("memory://local")
    }

    /// Creates an empty cluster reporting `name` as its endpoint.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State::default()),
        }
    }

    /// Adds an index with the given definition.
    #[must_use]
    pub fn with_index(self, index: &str, definition: IndexDefinition) -> Self {
        self.state.lock().indices.insert(
            index.to_string(),
            MemoryIndex {
                definition,
                documents: Vec::new(),
            },
        );
        self
    }

    /// Adds documents to an index, creating it with an empty definition if needed.
    #[must_use]
    pub fn with_documents(
        self,
        index: &str,
        documents: impl IntoIterator<Item = Document>,
    ) -> Self {
        for doc in documents {
            self.insert(index, doc);
        }
        self
    }

    /// Stores one document, replacing any document with the same identifier.
    pub fn insert(&self, index: &str, mut doc: Document) {
        doc.index = index.to_string();
        self.state
            .lock()
            .indices
            .entry(index.to_string())
            .or_default()
            .upsert(doc);
    }

    /// Documents of an index in insertion order. Empty for unknown indices.
    #[must_use]
    pub fn documents(&self, index: &str) -> Vec<Document> {
        self.state
            .lock()
            .indices
            .get(index)
            .map(|i| i.documents.clone())
            .unwrap_or_default()
    }

    /// Stored definition of an index.
    #[must_use]
    pub fn definition(&self, index: &str) -> Option<IndexDefinition> {
        self.state
            .lock()
            .indices
            .get(index)
            .map(|i| i.definition.clone())
    }

    /// Makes every future bulk write of `id` fail with a mapping error.
    pub fn reject(&self, id: impl Into<String>) {
        self.state.lock().rejected.insert(id.into());
    }

    /// Makes every request fail with a transport error while set.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Lets `requests` more bulk requests succeed, then fails the rest with a
    /// transport error.
    pub fn fail_bulk_after(&self, requests: usize) {
        self.state.lock().bulk_budget = Some(requests);
    }

    /// Number of scroll cursors ever opened.
    #[must_use]
    pub fn scans_opened(&self) -> usize {
        self.state.lock().scans_opened
    }

    /// Number of scroll cursors not yet cleared.
    #[must_use]
    pub fn open_scrolls(&self) -> usize {
        self.state.lock().cursors.len()
    }

    /// Number of bulk requests received, including rejected ones.
    #[must_use]
    pub fn bulk_requests(&self) -> usize {
        self.state.lock().bulk_requests
    }
}

/// Compiled form of the supported query subset.
enum Filter {
    All,
    Term { field: String, value: Value },
    Ids(HashSet<String>),
}

impl Filter {
    fn parse(body: &Value) -> Result<Self> {
        let Some(query) = body.get("query") else {
            return Ok(Self::All);
        };
        let Some((kind, clause)) = query.as_object().and_then(|q| q.iter().next()) else {
            return Err(Error::Query(format!("query must be an object, got {}", query)));
        };

        match kind.as_str() {
            "match_all" => Ok(Self::All),
            "term" => {
                let Some((field, value)) = clause.as_object().and_then(|c| c.iter().next()) else {
                    return Err(Error::Query("term query needs a field".to_string()));
                };
                let value = value.get("value").unwrap_or(value).clone();
                Ok(Self::Term {
                    field: field.clone(),
                    value,
                })
            }
            "ids" => {
                let values = clause
                    .get("values")
                    .and_then(Value::as_array)
                    .ok_or_else(|| Error::Query("ids query needs a values array".to_string()))?;
                Ok(Self::Ids(
                    values
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect(),
                ))
            }
            other => Err(Error::Query(format!(
                "unsupported query type '{}'",
                other
            ))),
        }
    }

    fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Term { field, value } => doc.source.get(field) == Some(value),
            Self::Ids(ids) => ids.contains(&doc.id),
        }
    }
}

#[async_trait]
impl SearchClient for MemoryClient {
    fn endpoint(&self) -> &str {
        &self.name
    }

    async fn open_scroll(
        &self,
        index: &str,
        body: &Value,
        _keep_alive: &str,
    ) -> Result<ScrollPage> {
        let filter = Filter::parse(body)?;
        let page_size = body
            .get("size")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_PAGE_SIZE, |s| s as usize)
            .max(1);

        let mut state = self.state.lock();
        state.ensure_reachable()?;

        let remaining: VecDeque<Document> = state
            .indices
            .get(index)
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))?
            .documents
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();

        state.scans_opened += 1;
        state.next_cursor += 1;
        let scroll_id = format!("memory-scroll-{}", state.next_cursor);

        let mut cursor = Cursor {
            remaining,
            page_size,
        };
        let documents = cursor.next_page();
        state.cursors.insert(scroll_id.clone(), cursor);

        Ok(ScrollPage {
            scroll_id: Some(scroll_id),
            documents,
        })
    }

    async fn next_scroll(&self, scroll_id: &str, _keep_alive: &str) -> Result<ScrollPage> {
        let mut state = self.state.lock();
        state.ensure_reachable()?;

        let cursor = state.cursors.get_mut(scroll_id).ok_or_else(|| Error::Status {
            status: 404,
            reason: format!("No search context found for id [{}]", scroll_id),
        })?;

        Ok(ScrollPage {
            scroll_id: Some(scroll_id.to_string()),
            documents: cursor.next_page(),
        })
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_reachable()?;
        state.cursors.remove(scroll_id);
        Ok(())
    }

    async fn bulk(&self, documents: &[Document]) -> Result<Vec<BulkOutcome>> {
        let mut state = self.state.lock();
        state.ensure_reachable()?;
        state.bulk_requests += 1;

        if let Some(budget) = state.bulk_budget.as_mut() {
            if *budget == 0 {
                return Err(unreachable_error());
            }
            *budget -= 1;
        }

        let mut outcomes = Vec::with_capacity(documents.len());
        for doc in documents {
            if state.rejected.contains(&doc.id) {
                outcomes.push(BulkOutcome::Failed(DocumentWriteError {
                    id: doc.id.clone(),
                    status: 400,
                    error_type: "mapper_parsing_exception".to_string(),
                    reason: "failed to parse document".to_string(),
                }));
                continue;
            }

            state
                .indices
                .entry(doc.index.clone())
                .or_default()
                .upsert(doc.clone());
            outcomes.push(BulkOutcome::Indexed { id: doc.id.clone() });
        }

        Ok(outcomes)
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let state = self.state.lock();
        state.ensure_reachable()?;
        Ok(state.indices.contains_key(index))
    }

    async fn get_index_definition(&self, index: &str) -> Result<IndexDefinition> {
        let state = self.state.lock();
        state.ensure_reachable()?;
        state
            .indices
            .get(index)
            .map(|i| i.definition.clone())
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))
    }

    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_reachable()?;
        if state.indices.contains_key(index) {
            return Err(Error::Status {
                status: 400,
                reason: format!("index [{}] already exists", index),
            });
        }
        state.indices.insert(
            index.to_string(),
            MemoryIndex {
                definition: definition.clone(),
                documents: Vec::new(),
            },
        );
        Ok(())
    }
}
