//! Record streams returned by an invocation.

use async_trait::async_trait;
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::rpc::record::Record;
use crate::rpc::status::Status;

/// Why `recv` produced no record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecvError {
    /// The stream ended cleanly.
    #[error("end of stream")]
    Exhausted,

    /// The stream failed; no further records will arrive.
    #[error(transparent)]
    Status(#[from] Status),
}

/// One-shot, ordered source of records from a single invocation.
#[async_trait]
pub trait Receiver: Send {
    async fn recv(&mut self) -> Result<Box<dyn Record>, RecvError>;
}

/// Receiver over records that are already in hand.
#[derive(Debug, Default)]
pub struct VecReceiver {
    parts: VecDeque<Result<Box<dyn Record>, Status>>,
}

impl VecReceiver {
    pub fn new(records: Vec<Box<dyn Record>>) -> Self {
        Self {
            parts: records.into_iter().map(Ok).collect(),
        }
    }

    /// A receiver yielding `records` and then failing with `status`.
    pub fn failing_after(records: Vec<Box<dyn Record>>, status: Status) -> Self {
        let mut parts: VecDeque<_> = records.into_iter().map(Ok).collect();
        parts.push_back(Err(status));
        Self { parts }
    }
}

#[async_trait]
impl Receiver for VecReceiver {
    async fn recv(&mut self) -> Result<Box<dyn Record>, RecvError> {
        match self.parts.pop_front() {
            Some(Ok(record)) => Ok(record),
            Some(Err(status)) => {
                self.parts.clear();
                Err(RecvError::Status(status))
            }
            None => Err(RecvError::Exhausted),
        }
    }
}

/// Receiver fed by a producer task.
///
/// The stream is exhausted once every sender has been dropped.
pub struct ChannelReceiver {
    rx: mpsc::Receiver<Result<Box<dyn Record>, Status>>,
}

impl ChannelReceiver {
    pub fn channel(buffer: usize) -> (mpsc::Sender<Result<Box<dyn Record>, Status>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }
}

#[async_trait]
impl Receiver for ChannelReceiver {
    async fn recv(&mut self) -> Result<Box<dyn Record>, RecvError> {
        match self.rx.recv().await {
            Some(Ok(record)) => Ok(record),
            Some(Err(status)) => {
                self.rx.close();
                Err(RecvError::Status(status))
            }
            None => Err(RecvError::Exhausted),
        }
    }
}
