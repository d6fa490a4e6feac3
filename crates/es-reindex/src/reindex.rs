//! End-to-end reindex run: provisioning, then the transfer pipeline.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::{ElasticsearchClient, SearchClient};
use crate::config::{resolve_query, ReindexConfig};
use crate::document::TransferResult;
use crate::error::Result;
use crate::pipeline::{Pipeline, TransferRequest};
use crate::provision::{IndexProvisioner, ProvisionOutcome};
use crate::source::{build_search_body, ScanOptions};
use crate::transform::{DocumentHook, FieldMappingHook, NoopHook};

/// What a reindex run did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunSummary {
    /// Only the target index was provisioned.
    MetadataOnly {
        /// Provisioning outcome.
        provision: ProvisionOutcome,
    },
    /// Documents were transferred.
    Transferred {
        /// Provisioning outcome.
        provision: ProvisionOutcome,
        /// Aggregated bulk outcomes.
        result: TransferResult,
    },
}

impl RunSummary {
    /// Provisioning outcome of the run.
    #[must_use]
    pub fn provision(&self) -> ProvisionOutcome {
        match self {
            Self::MetadataOnly { provision } | Self::Transferred { provision, .. } => *provision,
        }
    }

    /// Transfer result, absent in metadata-only runs.
    #[must_use]
    pub fn result(&self) -> Option<&TransferResult> {
        match self {
            Self::MetadataOnly { .. } => None,
            Self::Transferred { result, .. } => Some(result),
        }
    }
}

/// Runs a configured reindex between two clusters.
pub struct Reindexer {
    config: ReindexConfig,
    source: Arc<dyn SearchClient>,
    target: Arc<dyn SearchClient>,
    cancel: CancellationToken,
}

impl Reindexer {
    /// Validates `config` and connects to both clusters over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] for an invalid configuration.
    pub fn connect(config: ReindexConfig) -> Result<Self> {
        config.validate()?;
        let source = Arc::new(ElasticsearchClient::new(&config.source)?);
        let target = Arc::new(ElasticsearchClient::new(&config.target)?);
        Ok(Self::assemble(config, source, target))
    }

    /// Validates `config` and uses the given clients.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] for an invalid configuration.
    pub fn with_clients(
        config: ReindexConfig,
        source: Arc<dyn SearchClient>,
        target: Arc<dyn SearchClient>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, source, target))
    }

    fn assemble(
        config: ReindexConfig,
        source: Arc<dyn SearchClient>,
        target: Arc<dyn SearchClient>,
    ) -> Self {
        Self {
            config,
            source,
            target,
            cancel: CancellationToken::new(),
        }
    }

    /// Stops the transfer between batches once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Runs the reindex.
    ///
    /// The query is loaded and checked before any cluster I/O. The target
    /// index is provisioned next; in metadata-only mode the run stops there
    /// without opening a scan.
    ///
    /// # Errors
    ///
    /// Config, query and transport errors, or [`crate::Error::Cancelled`].
    /// Per-document write failures are part of the returned result.
    pub async fn execute(&self) -> Result<RunSummary> {
        let options = &self.config.options;
        let query = resolve_query(self.config.query.as_deref())?;
        build_search_body(query.as_deref(), options.scroll_size)?;

        let provision = IndexProvisioner::new(Arc::clone(&self.source), Arc::clone(&self.target))
            .with_dry_run(options.dry_run)
            .ensure_target_index(&self.config.source_index, &self.config.target_index)
            .await?;

        if options.only_metadata {
            info!("Metadata-only mode, skipping document transfer");
            return Ok(RunSummary::MetadataOnly { provision });
        }

        let hook: Arc<dyn DocumentHook> = if options.field_mappings.is_empty() {
            Arc::new(NoopHook)
        } else {
            Arc::new(FieldMappingHook::new(&options.field_mappings))
        };

        let pipeline = Pipeline::new(Arc::clone(&self.source), Arc::clone(&self.target))
            .with_scan_options(ScanOptions {
                scroll_size: options.scroll_size,
                keep_alive: options.scroll_keep_alive.clone(),
            })
            .with_chunk_size(options.chunk_size)
            .with_dry_run(options.dry_run)
            .with_hook(hook)
            .with_cancellation(self.cancel.clone());

        let request = TransferRequest {
            source_index: self.config.source_index.clone(),
            query,
            target_index: self.config.target_index.clone(),
            limit: self.config.limit,
            routing: self.config.routing.clone(),
            num_threads: options.num_threads,
        };
        let result = pipeline.run(&request).await?;

        Ok(RunSummary::Transferred { provision, result })
    }
}
