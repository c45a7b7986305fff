//! Chunked response output.
//!
//! # Responsibilities
//! - Coalesce small writes into chunks of a configured size
//! - Hand chunks to an async sink (the streaming response body, or a buffer in tests)

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::sync::mpsc;

/// The receiving end of the response is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("response receiver closed")]
pub struct SinkClosed;

/// Async destination for response chunks.
#[async_trait]
pub trait ChunkSink: Send {
    async fn send_chunk(&mut self, chunk: Bytes) -> Result<(), SinkClosed>;
}

#[async_trait]
impl ChunkSink for Vec<u8> {
    async fn send_chunk(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        self.extend_from_slice(&chunk);
        Ok(())
    }
}

/// Feeds `axum::body::Body::from_stream` through a `ReceiverStream`.
#[async_trait]
impl ChunkSink for mpsc::Sender<Result<Bytes, std::io::Error>> {
    async fn send_chunk(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        self.send(Ok(chunk)).await.map_err(|_| SinkClosed)
    }
}

/// Buffered writer over a `ChunkSink`.
pub struct ResponseWriter<S> {
    sink: S,
    buf: BytesMut,
    threshold: usize,
    written: u64,
}

impl<S: ChunkSink> ResponseWriter<S> {
    pub fn new(sink: S, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            sink,
            buf: BytesMut::with_capacity(threshold),
            threshold,
            written: 0,
        }
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<(), SinkClosed> {
        self.buf.extend_from_slice(data);
        self.written += data.len() as u64;
        if self.buf.len() >= self.threshold {
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), SinkClosed> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.sink.send_chunk(chunk).await
    }

    /// Total bytes accepted so far, flushed or not.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Unflushed bytes are dropped; flush first.
    pub fn into_inner(self) -> S {
        self.sink
    }
}
