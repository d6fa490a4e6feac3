//! Bulk writer: batches documents and submits them to the target cluster.
//!
//! With `num_threads <= 1` batches are written one after the other and
//! outcomes come out in stream order. With more threads, a pool of workers
//! pulls batches from a shared bounded queue; outcomes interleave across
//! workers but each worker keeps the order of the batches it received.

use futures::{Stream, TryStreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::SearchClient;
use crate::document::{BulkOutcome, Document};
use crate::error::{Error, Result};

/// Bulk writer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    /// Concurrent workers; 1 or less writes sequentially.
    pub num_threads: usize,
    /// Documents per bulk request.
    pub chunk_size: usize,
    /// Report every document as written without submitting anything.
    pub dry_run: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            num_threads: 1,
            chunk_size: 500,
            dry_run: false,
        }
    }
}

/// Writes a document stream to the target cluster.
pub struct BulkWriter {
    client: Arc<dyn SearchClient>,
    options: WriterOptions,
    cancel: CancellationToken,
}

impl BulkWriter {
    /// Creates a writer.
    pub fn new(client: Arc<dyn SearchClient>, options: WriterOptions) -> Self {
        Self {
            client,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Stops the writer between batches once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Drains `documents`, sending exactly one outcome per document to `outcomes`.
    ///
    /// Per-document rejections are outcomes, not errors. Returns once every
    /// batch has been submitted and its outcomes sent.
    ///
    /// # Errors
    ///
    /// Returns the first error of the source stream or of a bulk request
    /// (after the client's own retries), [`Error::Cancelled`] on
    /// cancellation and [`Error::Worker`] if a worker panicked. In-flight
    /// workers are aborted.
    pub async fn write<S>(&self, documents: S, outcomes: mpsc::Sender<BulkOutcome>) -> Result<()>
    where
        S: Stream<Item = Result<Document>> + Send,
    {
        let documents = std::pin::pin!(documents);
        if self.options.num_threads <= 1 {
            self.write_sequential(documents, outcomes).await
        } else {
            self.write_parallel(documents, outcomes).await
        }
    }

    async fn write_sequential<S>(
        &self,
        mut documents: Pin<&mut S>,
        outcomes: mpsc::Sender<BulkOutcome>,
    ) -> Result<()>
    where
        S: Stream<Item = Result<Document>> + Send,
    {
        let mut batches = 0u64;
        loop {
            self.check_cancelled()?;
            let Some(batch) = next_batch(&mut documents, self.options.chunk_size).await? else {
                break;
            };
            batches += 1;
            debug!("Submitting batch {} ({} documents)", batches, batch.len());

            let results = submit(self.client.as_ref(), &batch, self.options.dry_run).await?;
            forward(&outcomes, results).await?;
        }
        Ok(())
    }

    async fn write_parallel<S>(
        &self,
        documents: Pin<&mut S>,
        outcomes: mpsc::Sender<BulkOutcome>,
    ) -> Result<()>
    where
        S: Stream<Item = Result<Document>> + Send,
    {
        let workers = self.options.num_threads;
        let (batch_tx, batch_rx) = mpsc::channel::<Vec<Document>>(workers);
        let batch_rx = Arc::new(Mutex::new(batch_rx));

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            let batch_rx = Arc::clone(&batch_rx);
            let client = Arc::clone(&self.client);
            let outcomes = outcomes.clone();
            let cancel = self.cancel.clone();
            let dry_run = self.options.dry_run;

            pool.spawn(async move {
                loop {
                    let batch = batch_rx.lock().await.recv().await;
                    let Some(batch) = batch else {
                        return Ok(());
                    };
                    if cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    debug!("Worker {} submitting {} documents", worker, batch.len());
                    let results = submit(client.as_ref(), &batch, dry_run).await?;
                    forward(&outcomes, results).await?;
                }
            });
        }
        // Workers hold the only outcome senders left; the collector ends when they do
        drop(outcomes);
        drop(batch_rx);

        let produced = self.produce(documents, &batch_tx, &mut pool).await;
        drop(batch_tx);

        if let Err(e) = produced {
            pool.abort_all();
            return Err(e);
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = flatten(joined) {
                pool.abort_all();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Feeds batches to the pool until the stream ends, watching for a
    /// worker that stops early.
    async fn produce<S>(
        &self,
        mut documents: Pin<&mut S>,
        batch_tx: &mpsc::Sender<Vec<Document>>,
        pool: &mut JoinSet<Result<()>>,
    ) -> Result<()>
    where
        S: Stream<Item = Result<Document>> + Send,
    {
        loop {
            self.check_cancelled()?;
            let Some(batch) = next_batch(&mut documents, self.options.chunk_size).await? else {
                return Ok(());
            };

            tokio::select! {
                sent = batch_tx.send(batch) => {
                    if sent.is_err() {
                        // Every worker is gone; the pool says why
                        return Ok(());
                    }
                }
                Some(joined) = pool.join_next() => {
                    flatten(joined)?;
                    return Err(Error::Worker("writer worker exited early".to_string()));
                }
            }
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

/// Pulls up to `size` documents; `None` once the stream is exhausted.
async fn next_batch<S>(documents: &mut Pin<&mut S>, size: usize) -> Result<Option<Vec<Document>>>
where
    S: Stream<Item = Result<Document>>,
{
    let mut batch = Vec::with_capacity(size);
    while batch.len() < size.max(1) {
        match documents.try_next().await? {
            Some(doc) => batch.push(doc),
            None => break,
        }
    }
    Ok((!batch.is_empty()).then_some(batch))
}

async fn submit(
    client: &dyn SearchClient,
    batch: &[Document],
    dry_run: bool,
) -> Result<Vec<BulkOutcome>> {
    if dry_run {
        return Ok(batch
            .iter()
            .map(|doc| BulkOutcome::Indexed { id: doc.id.clone() })
            .collect());
    }

    let outcomes = client.bulk(batch).await?;
    for outcome in &outcomes {
        if let BulkOutcome::Failed(e) = outcome {
            warn!("{}", e);
        }
    }
    Ok(outcomes)
}

async fn forward(outcomes: &mpsc::Sender<BulkOutcome>, results: Vec<BulkOutcome>) -> Result<()> {
    for outcome in results {
        outcomes
            .send(outcome)
            .await
            .map_err(|_| Error::Worker("outcome collector stopped".to_string()))?;
    }
    Ok(())
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.map_err(|e| Error::Worker(format!("writer worker failed: {}", e)))?
}

#[cfg(test)]
#[path = "writer_tests.rs"]
mod tests;
