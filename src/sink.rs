//! Hand-off of synthesized queries to asynchronous batch execution.
//!
//! Featurizers call [`QuerySink::submit`] synchronously, in feature-index
//! order. Sinks may be shared by featurizers running on different threads;
//! order is preserved per submitting thread only.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::error::{FeaturizeError, Result};

pub trait QuerySink: Send + Sync {
    fn submit(&self, query: &str) -> Result<()>;
}

/// Mutex-guarded in-memory buffer.
#[derive(Debug, Default)]
pub struct BufferSink {
    queries: Mutex<Vec<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.queries
            .lock()
            .map(|q| q.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn take(&self) -> Vec<String> {
        match self.queries.lock() {
            Ok(mut q) => std::mem::take(&mut *q),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl QuerySink for BufferSink {
    fn submit(&self, query: &str) -> Result<()> {
        let mut queries = self
            .queries
            .lock()
            .map_err(|_| FeaturizeError::SinkSubmissionFailed("buffer lock poisoned".into()))?;
        queries.push(query.to_string());
        Ok(())
    }
}

/// A query tagged with the featurizer that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedQuery {
    pub origin: String,
    pub sql: String,
}

/// Producer half of a query channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SubmittedQuery>,
    origin: String,
}

impl ChannelSink {
    /// Create a sink and the batch consumer draining it.
    pub fn channel(origin: impl Into<String>, batch_size: usize) -> (Self, QueryBatches) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx,
            origin: origin.into(),
        };
        (sink, QueryBatches::new(rx, batch_size))
    }

    /// Another producer on the same channel with a different origin tag.
    pub fn with_origin(&self, origin: impl Into<String>) -> Self {
        Self {
            tx: self.tx.clone(),
            origin: origin.into(),
        }
    }
}

impl QuerySink for ChannelSink {
    fn submit(&self, query: &str) -> Result<()> {
        self.tx
            .send(SubmittedQuery {
                origin: self.origin.clone(),
                sql: query.to_string(),
            })
            .map_err(|_| {
                FeaturizeError::SinkSubmissionFailed(format!(
                    "query channel for `{}` is closed",
                    self.origin
                ))
            })
    }
}

/// Consumer half of a query channel, yielding submissions in batches.
#[derive(Debug)]
pub struct QueryBatches {
    rx: mpsc::UnboundedReceiver<SubmittedQuery>,
    batch_size: usize,
}

impl QueryBatches {
    fn new(rx: mpsc::UnboundedReceiver<SubmittedQuery>, batch_size: usize) -> Self {
        Self {
            rx,
            batch_size: batch_size.max(1),
        }
    }

    /// Wait for at least one query, then take whatever else is already queued
    /// up to the batch size. Returns `None` once every producer is dropped and
    /// the queue is empty.
    pub async fn next_batch(&mut self) -> Option<Vec<SubmittedQuery>> {
        let first = self.rx.recv().await?;
        let mut batch = Vec::with_capacity(self.batch_size);
        batch.push(first);
        while batch.len() < self.batch_size {
            match self.rx.try_recv() {
                Ok(query) => batch.push(query),
                Err(_) => break,
            }
        }
        Some(batch)
    }

    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_buffer_sink_keeps_order() {
        let sink = BufferSink::new();
        sink.submit("q1").unwrap();
        sink.submit("q2").unwrap();
        assert_eq!(sink.snapshot(), vec!["q1", "q2"]);
        assert_eq!(sink.take(), vec!["q1", "q2"]);
        assert!(sink.snapshot().is_empty());
    }

    #[test]
    fn test_buffer_sink_concurrent_submissions() {
        let sink = Arc::new(BufferSink::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        sink.submit(&format!("{}:{}", t, i)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let all = sink.snapshot();
        assert_eq!(all.len(), 400);
        for t in 0..4 {
            let prefix = format!("{}:", t);
            let own: Vec<usize> = all
                .iter()
                .filter_map(|q| q.strip_prefix(&prefix))
                .map(|i| i.parse().unwrap())
                .collect();
            assert_eq!(own, (0..100).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_channel_batches() {
        let (sink, mut batches) = ChannelSink::channel("SignalDC", 2);
        let other = sink.with_origin("SignalInit");
        sink.submit("a").unwrap();
        sink.submit("b").unwrap();
        other.submit("c").unwrap();
        drop(sink);
        drop(other);

        let first = batches.next_batch().await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].sql, "a");
        assert_eq!(first[1].sql, "b");

        let second = batches.next_batch().await.unwrap();
        assert_eq!(
            second,
            vec![SubmittedQuery {
                origin: "SignalInit".into(),
                sql: "c".into()
            }]
        );
        assert!(batches.next_batch().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_channel_rejects() {
        let (sink, mut batches) = ChannelSink::channel("SignalDC", 8);
        batches.close();
        let err = sink.submit("SELECT 1").unwrap_err();
        assert!(matches!(err, FeaturizeError::SinkSubmissionFailed(_)));
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_clamped() {
        let (sink, mut batches) = ChannelSink::channel("SignalDC", 0);
        sink.submit("a").unwrap();
        sink.submit("b").unwrap();
        assert_eq!(batches.next_batch().await.unwrap().len(), 1);
    }
}
