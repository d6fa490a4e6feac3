// Reindex tool - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # es-reindex
//!
//! `es-reindex` copies documents from an index on one Elasticsearch or
//! OpenSearch cluster into an index on another (or the same) cluster.
//!
//! Documents are read through a scroll cursor, retargeted and rerouted by
//! the transform stage, and written with the bulk API by one or more
//! workers. Per-document rejections are collected into a
//! [`TransferResult`] instead of failing the run.
//!
//! ## Quick Start
//!
//! ```bash
//! # Copy everything, creating the target from the source definition
//! es-reindex --source-host es-old --target-host es-new -s products -t products-v2
//!
//! # Filtered, limited, routed, four writers
//! es-reindex -s products -t products-eu -q @query.json -l 10000 \
//!     --target-routing eu-1,eu-2 --num-threads 4
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! source:
//!   host: es-old.internal
//!   port: 9200
//! target:
//!   scheme: https
//!   host: es-new.internal
//!   api_key: "<base64 api key>"
//! source_index: products
//! target_index: products-v2
//! routing: "eu-1, eu-2"
//!
//! options:
//!   num_threads: 4
//!   chunk_size: 500
//!   scroll_keep_alive: 5m
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod provision;
pub mod reindex;
pub mod retry;
pub mod source;
pub mod transform;
pub mod writer;

pub use client::{ElasticsearchClient, IndexDefinition, MemoryClient, SearchClient};
pub use config::{ClusterConfig, ReindexConfig, ReindexOptions};
pub use document::{BulkOutcome, Document, DocumentWriteError, Payload, TransferResult};
pub use error::{Error, ErrorKind, Result};
pub use pipeline::{Pipeline, RunState, TransferRequest};
pub use provision::{IndexProvisioner, ProvisionOutcome};
pub use reindex::{Reindexer, RunSummary};
pub use source::{DocumentSource, ScanOptions};
pub use transform::{DocumentHook, FieldMappingHook, NoopHook, RoutingSpec, Transformer};
pub use writer::{BulkWriter, WriterOptions};
