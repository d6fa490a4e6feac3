//! Tests for the bulk writer.

use super::*;
use crate::client::MemoryClient;
use crate::error::ErrorKind;
use futures::stream;
use std::collections::HashSet;

fn docs(count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| Document::new(format!("id-{}", i), "target", Default::default()))
        .collect()
}

fn as_stream(documents: Vec<Document>) -> impl Stream<Item = Result<Document>> + Send {
    stream::iter(documents.into_iter().map(Ok))
}

fn options(num_threads: usize, chunk_size: usize) -> WriterOptions {
    WriterOptions {
        num_threads,
        chunk_size,
        dry_run: false,
    }
}

async fn run(
    client: Arc<MemoryClient>,
    options: WriterOptions,
    documents: Vec<Document>,
) -> (Result<()>, Vec<BulkOutcome>) {
    let (tx, mut rx) = mpsc::channel(1024);
    let writer = BulkWriter::new(client, options);
    let result = writer.write(as_stream(documents), tx).await;

    let mut outcomes = Vec::new();
    while let Some(outcome) = rx.recv().await {
        outcomes.push(outcome);
    }
    (result, outcomes)
}

#[tokio::test]
async fn test_sequential_preserves_order_and_batches() {
    // Arrange
    let client = Arc::new(MemoryClient::new());

    // Act
    let (result, outcomes) = run(client.clone(), options(1, 3), docs(10)).await;

    // Assert
    result.unwrap();
    let ids: Vec<&str> = outcomes.iter().map(BulkOutcome::id).collect();
    let expected: Vec<String> = (0..10).map(|i| format!("id-{}", i)).collect();
    assert_eq!(ids, expected);
    assert_eq!(client.bulk_requests(), 4);
    assert_eq!(client.documents("target").len(), 10);
}

#[tokio::test]
async fn test_parallel_yields_exactly_one_outcome_per_document() {
    let client = Arc::new(MemoryClient::new());

    let (result, outcomes) = run(client.clone(), options(4, 7), docs(200)).await;

    result.unwrap();
    assert_eq!(outcomes.len(), 200);
    let ids: HashSet<&str> = outcomes.iter().map(BulkOutcome::id).collect();
    assert_eq!(ids.len(), 200);
    assert_eq!(client.bulk_requests(), 29);
}

#[tokio::test]
async fn test_rejected_document_does_not_abort_batch() {
    let client = Arc::new(MemoryClient::new());
    client.reject("id-2");

    let (result, outcomes) = run(client.clone(), options(1, 5), docs(5)).await;

    result.unwrap();
    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|o| !o.is_success())
        .map(BulkOutcome::id)
        .collect();
    assert_eq!(failed, ["id-2"]);
    assert_eq!(client.documents("target").len(), 4);
}

#[tokio::test]
async fn test_dry_run_submits_nothing() {
    let client = Arc::new(MemoryClient::new());
    let options = WriterOptions {
        dry_run: true,
        ..options(2, 4)
    };

    let (result, outcomes) = run(client.clone(), options, docs(9)).await;

    result.unwrap();
    assert_eq!(outcomes.len(), 9);
    assert!(outcomes.iter().all(BulkOutcome::is_success));
    assert_eq!(client.bulk_requests(), 0);
}

#[tokio::test]
async fn test_transport_failure_is_fatal_sequential() {
    let client = Arc::new(MemoryClient::new());
    client.fail_bulk_after(1);

    let (result, outcomes) = run(client, options(1, 2), docs(6)).await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Transport);
    assert_eq!(outcomes.len(), 2);
}

#[tokio::test]
async fn test_transport_failure_is_fatal_parallel() {
    let client = Arc::new(MemoryClient::new());
    client.fail_bulk_after(2);

    let (result, _) = run(client, options(3, 2), docs(40)).await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn test_cancelled_before_first_batch() {
    let client = Arc::new(MemoryClient::new());
    let token = CancellationToken::new();
    token.cancel();
    let (tx, _rx) = mpsc::channel(16);

    let writer = BulkWriter::new(client.clone(), options(1, 2)).with_cancellation(token);
    let err = writer.write(as_stream(docs(4)), tx).await.unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(client.bulk_requests(), 0);
}

#[tokio::test]
async fn test_cancelled_parallel() {
    let client = Arc::new(MemoryClient::new());
    let token = CancellationToken::new();
    token.cancel();
    let (tx, _rx) = mpsc::channel(16);

    let writer = BulkWriter::new(client.clone(), options(3, 2)).with_cancellation(token);
    let err = writer.write(as_stream(docs(4)), tx).await.unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(client.bulk_requests(), 0);
}

#[tokio::test]
async fn test_source_error_propagates() {
    let client = Arc::new(MemoryClient::new());
    let items = vec![
        Ok(Document::new("a", "target", Default::default())),
        Err(Error::Status {
            status: 404,
            reason: "No search context found".to_string(),
        }),
    ];
    let (tx, _rx) = mpsc::channel(16);

    let writer = BulkWriter::new(client, options(1, 10));
    let err = writer.write(stream::iter(items), tx).await.unwrap_err();

    assert!(matches!(err, Error::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_empty_stream_writes_nothing() {
    let client = Arc::new(MemoryClient::new());

    let (result, outcomes) = run(client.clone(), options(2, 10), Vec::new()).await;

    result.unwrap();
    assert!(outcomes.is_empty());
    assert_eq!(client.bulk_requests(), 0);
}
