//! Search cluster clients.
//!
//! The pipeline only talks to clusters through [`SearchClient`]. The
//! [`elasticsearch`] module speaks the REST API over HTTP; [`memory`] keeps
//! indices in process and backs the test suite.

pub mod common;
pub mod elasticsearch;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{BulkOutcome, Document};
use crate::error::Result;

pub use elasticsearch::ElasticsearchClient;
pub use memory::MemoryClient;

/// Settings the cluster assigns itself and refuses on index creation.
const SERVER_ASSIGNED_SETTINGS: [&str; 4] = ["uuid", "creation_date", "provided_name", "version"];

/// One page of a scroll cursor.
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    /// Cursor handle for the next page; may change between pages.
    pub scroll_id: Option<String>,
    /// Documents in this page. Empty once the cursor is exhausted.
    pub documents: Vec<Document>,
}

/// Settings, mappings and aliases of an index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Index settings.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub settings: Value,
    /// Field mappings.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub mappings: Value,
    /// Aliases pointing at the index.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub aliases: Value,
}

impl IndexDefinition {
    /// Definition suitable for creating a copy of the index elsewhere.
    ///
    /// Aliases are dropped so they do not end up pointing at both indices,
    /// and server-assigned settings are stripped in nested and flat form.
    #[must_use]
    pub fn for_copy(&self) -> Self {
        let mut settings = self.settings.clone();
        if let Some(map) = settings.as_object_mut() {
            if let Some(Value::Object(index)) = map.get_mut("index") {
                for key in SERVER_ASSIGNED_SETTINGS {
                    index.remove(key);
                }
            }
            map.retain(|key, _| {
                !SERVER_ASSIGNED_SETTINGS
                    .iter()
                    .any(|s| key == &format!("index.{s}") || key.starts_with(&format!("index.{s}.")))
            });
        }

        Self {
            settings,
            mappings: self.mappings.clone(),
            aliases: Value::Null,
        }
    }
}

/// Capability surface of a search cluster.
///
/// Implementations must be safe to share between writer workers.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Human readable endpoint, used in logs.
    fn endpoint(&self) -> &str;

    /// Runs the initial search of a scroll and returns its first page.
    async fn open_scroll(&self, index: &str, body: &Value, keep_alive: &str)
        -> Result<ScrollPage>;

    /// Fetches the next page of an open scroll, renewing its lease.
    async fn next_scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<ScrollPage>;

    /// Releases the server-side state of a scroll.
    async fn clear_scroll(&self, scroll_id: &str) -> Result<()>;

    /// Writes documents in one request.
    ///
    /// Returns exactly one outcome per document, in submission order.
    /// Per-document rejections are outcomes, not errors.
    async fn bulk(&self, documents: &[Document]) -> Result<Vec<BulkOutcome>>;

    /// Checks whether an index exists.
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Reads settings, mappings and aliases of an index.
    async fn get_index_definition(&self, index: &str) -> Result<IndexDefinition>;

    /// Creates an index from a definition.
    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> Result<()>;
}
