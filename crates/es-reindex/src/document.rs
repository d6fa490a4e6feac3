//! Documents, bulk outcomes and the aggregate transfer result.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque field-value mapping carried through the pipeline untouched.
pub type Payload = Map<String, Value>;

/// A document as returned by a scroll page and submitted by a bulk write.
///
/// Field names follow the search hit envelope, so a hit deserializes directly
/// into a `Document` and unknown envelope fields (`_score`, `sort`, ...) are
/// ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier, unique within its index.
    #[serde(rename = "_id")]
    pub id: String,
    /// Destination index tag.
    #[serde(rename = "_index")]
    pub index: String,
    /// Shard routing key.
    #[serde(rename = "_routing", default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    /// Document body.
    #[serde(rename = "_source", default)]
    pub source: Payload,
}

impl Document {
    /// Creates a document without routing.
    pub fn new(id: impl Into<String>, index: impl Into<String>, source: Payload) -> Self {
        Self {
            id: id.into(),
            index: index.into(),
            routing: None,
            source,
        }
    }

    /// Sets the routing key.
    #[must_use]
    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }
}

/// Per-document write rejection reported by the target cluster.
///
/// Mapping conflicts, version conflicts and validation failures all end up
/// here. Recorded as a failed outcome; never escalated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[error("document '{id}' rejected with HTTP {status} ({error_type}): {reason}")]
pub struct DocumentWriteError {
    /// Identifier of the rejected document.
    pub id: String,
    /// Item status from the bulk response.
    pub status: u16,
    /// Cluster error type, e.g. `mapper_parsing_exception`.
    pub error_type: String,
    /// Human readable reason.
    pub reason: String,
}

/// Result of one attempted document write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOutcome {
    /// Document stored in the target index.
    Indexed {
        /// Identifier of the written document.
        id: String,
    },
    /// Document rejected by the target cluster.
    Failed(DocumentWriteError),
}

impl BulkOutcome {
    /// Returns true for a stored document.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Indexed { .. })
    }

    /// Identifier of the document this outcome belongs to.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Indexed { id } => id,
            Self::Failed(err) => &err.id,
        }
    }
}

/// Aggregate of every bulk outcome of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferResult {
    /// Documents stored.
    pub success: u64,
    /// Documents rejected.
    pub failed: u64,
    /// Identifiers of rejected documents, in the order their outcomes arrived.
    pub failed_ids: Vec<String>,
}

impl TransferResult {
    /// Total number of outcomes seen.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.success + self.failed
    }

    pub(crate) fn record(&mut self, outcome: BulkOutcome) {
        match outcome {
            BulkOutcome::Indexed { .. } => self.success += 1,
            BulkOutcome::Failed(err) => {
                self.failed += 1;
                self.failed_ids.push(err.id);
            }
        }
    }
}
