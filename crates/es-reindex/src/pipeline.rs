//! Reindexing pipeline orchestration.
//!
//! Wires the document source, the transform stage and the bulk writer, and
//! folds every bulk outcome into one [`TransferResult`].

use futures::TryStreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::SearchClient;
use crate::document::{BulkOutcome, TransferResult};
use crate::error::Result;
use crate::source::{DocumentSource, ScanOptions};
use crate::transform::{DocumentHook, NoopHook, RoutingSpec, Transformer};
use crate::writer::{BulkWriter, WriterOptions};

/// Parameters of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Index to scan.
    pub source_index: String,
    /// Raw JSON query; `None` matches every document.
    pub query: Option<String>,
    /// Index the documents are written to.
    pub target_index: String,
    /// Maximum number of documents to transfer.
    pub limit: Option<u64>,
    /// Comma-separated routing candidates.
    pub routing: Option<String>,
    /// Bulk writer workers.
    pub num_threads: usize,
}

impl TransferRequest {
    /// Transfer of every document with one writer and no routing.
    pub fn new(source_index: impl Into<String>, target_index: impl Into<String>) -> Self {
        Self {
            source_index: source_index.into(),
            query: None,
            target_index: target_index.into(),
            limit: None,
            routing: None,
            num_threads: 1,
        }
    }

    /// Filters the scan with a raw JSON query.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Transfers at most `limit` documents.
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Assigns routing keys from a comma-separated candidate list.
    #[must_use]
    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    /// Sets the number of bulk writer workers.
    #[must_use]
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }
}

/// Lifecycle of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// `run` has not been called.
    NotStarted,
    /// Scanning and writing, overlapped.
    Transferring,
    /// Every document has produced its outcome.
    Drained,
    /// The result has been handed to the caller.
    Completed,
    /// A fatal error or cancellation ended the run without a result.
    Aborted,
}

/// Source → transform → bulk writer pipeline.
pub struct Pipeline {
    source: Arc<dyn SearchClient>,
    target: Arc<dyn SearchClient>,
    scan: ScanOptions,
    chunk_size: usize,
    dry_run: bool,
    hook: Arc<dyn DocumentHook>,
    cancel: CancellationToken,
    state: watch::Sender<RunState>,
}

impl Pipeline {
    /// Creates a pipeline between two clusters (possibly the same one).
    pub fn new(source: Arc<dyn SearchClient>, target: Arc<dyn SearchClient>) -> Self {
        let (state, _) = watch::channel(RunState::NotStarted);
        Self {
            source,
            target,
            scan: ScanOptions::default(),
            chunk_size: WriterOptions::default().chunk_size,
            dry_run: false,
            hook: Arc::new(NoopHook),
            cancel: CancellationToken::new(),
            state,
        }
    }

    /// Sets the scroll page size and cursor lease.
    #[must_use]
    pub fn with_scan_options(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    /// Sets the number of documents per bulk request.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Scans and transforms without writing.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets the payload-rewrite hook run on every document.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn DocumentHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Stops the run between batches once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Watches the run state.
    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Current run state.
    #[must_use]
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Transfers every matching document and returns the aggregated result.
    ///
    /// Returns only after the stream is fully drained. Per-document write
    /// failures are counted in the result and never fail the run.
    ///
    /// # Errors
    ///
    /// Query errors from opening the scan, transport errors from either
    /// cluster and [`crate::Error::Cancelled`]. No result is produced in
    /// that case; documents already written stay in the target.
    pub async fn run(&self, request: &TransferRequest) -> Result<TransferResult> {
        let outcome = self.transfer(request).await;
        self.state.send_replace(if outcome.is_ok() {
            RunState::Completed
        } else {
            RunState::Aborted
        });
        outcome
    }

    async fn transfer(&self, request: &TransferRequest) -> Result<TransferResult> {
        let start = Instant::now();
        self.state.send_replace(RunState::Transferring);
        info!(
            "Transferring {} -> {} ({} writer(s){})",
            request.source_index,
            request.target_index,
            request.num_threads.max(1),
            if self.dry_run { ", dry run" } else { "" }
        );

        let source = DocumentSource::open(
            Arc::clone(&self.source),
            &request.source_index,
            request.query.as_deref(),
            &self.scan,
            request.limit,
        )
        .await?;

        let transformer = Transformer::new(
            request.target_index.as_str(),
            RoutingSpec::parse(request.routing.as_deref()),
        )
        .with_hook(Arc::clone(&self.hook));
        let documents = source
            .into_stream()
            .map_ok(move |doc| transformer.apply(doc));

        let writer = BulkWriter::new(
            Arc::clone(&self.target),
            WriterOptions {
                num_threads: request.num_threads,
                chunk_size: self.chunk_size,
                dry_run: self.dry_run,
            },
        )
        .with_cancellation(self.cancel.clone());

        let (tx, rx) = mpsc::channel(self.chunk_size.max(1));
        let ((), result) = tokio::try_join!(writer.write(documents, tx), collect_outcomes(rx))?;
        self.state.send_replace(RunState::Drained);

        let elapsed = start.elapsed().as_secs_f64();
        let throughput = if elapsed > 0.0 {
            result.total() as f64 / elapsed
        } else {
            0.0
        };
        info!(
            "Transfer complete: {} succeeded, {} failed in {:.2}s ({:.0} docs/sec)",
            result.success, result.failed, elapsed, throughput
        );

        Ok(result)
    }
}

/// Single aggregation point for outcomes coming from every worker.
async fn collect_outcomes(mut outcomes: mpsc::Receiver<BulkOutcome>) -> Result<TransferResult> {
    let mut result = TransferResult::default();
    while let Some(outcome) = outcomes.recv().await {
        result.record(outcome);
    }
    Ok(result)
}
