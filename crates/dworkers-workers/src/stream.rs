use crate::worker::WorkerOutput;
use dworkers_core::{DworkersError, DworkersResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Events emitted while a worker generates its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A chunk of generated text.
    Delta {
        /// The increment.
        text: String,
    },
    /// Generation finished; carries the complete output.
    Done {
        /// Same value the non-streaming run returns.
        output: serde_json::Value,
    },
    /// Generation failed.
    Error {
        /// Failure detail.
        message: String,
    },
}

/// How deltas are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// One delta per increment the backend produces.
    #[default]
    Incremental,
    /// A single delta with the whole text, once generation is done.
    Buffered,
}

/// Producer-side handle for pushing text increments into a [`WorkerStream`].
///
/// In buffered mode increments are discarded; the full text is emitted once
/// the producer returns.
pub struct DeltaSink {
    tx: Option<mpsc::Sender<StreamEvent>>,
}

impl DeltaSink {
    /// A sink that drops everything. Used for non-streaming completions.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    /// Push one increment. Waits until the consumer has taken the previous
    /// item. Fails with `Cancelled` once the consumer is gone.
    pub async fn send(&self, text: impl Into<String>) -> DworkersResult<()> {
        match &self.tx {
            Some(tx) => tx
                .send(StreamEvent::Delta { text: text.into() })
                .await
                .map_err(|_| DworkersError::Cancelled),
            None => Ok(()),
        }
    }
}

/// A lazy, forward-only, single-consumer stream of [`StreamEvent`]s.
///
/// Backed by a channel of capacity 1, so the producer runs at most one item
/// ahead of the consumer. Dropping the stream or calling
/// [`WorkerStream::cancel`] cancels its token and aborts the producer task.
pub struct WorkerStream {
    rx: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
    producer: Option<JoinHandle<()>>,
}

impl WorkerStream {
    /// Spawn `produce` as the producer. It receives a [`DeltaSink`] for
    /// increments and returns the final output; the stream then emits
    /// `Done` (or `Error` for a failed output).
    pub fn spawn<F, Fut>(mode: StreamMode, produce: F) -> Self
    where
        F: FnOnce(DeltaSink) -> Fut + Send + 'static,
        Fut: Future<Output = DworkersResult<WorkerOutput>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let producer = tokio::spawn(async move {
            let sink = DeltaSink {
                tx: match mode {
                    StreamMode::Incremental => Some(tx.clone()),
                    StreamMode::Buffered => None,
                },
            };
            let result = tokio::select! {
                _ = token.cancelled() => {
                    debug!("Worker stream cancelled");
                    return;
                }
                result = produce(sink) => result,
            };

            let events = match result {
                Ok(output) if output.success => {
                    let mut events = Vec::with_capacity(2);
                    if mode == StreamMode::Buffered {
                        events.push(StreamEvent::Delta {
                            text: output.text(),
                        });
                    }
                    events.push(StreamEvent::Done {
                        output: output.output,
                    });
                    events
                }
                Ok(output) => vec![StreamEvent::Error {
                    message: output.error.unwrap_or_else(|| "worker failed".to_string()),
                }],
                Err(DworkersError::Cancelled) => return,
                Err(e) => vec![StreamEvent::Error {
                    message: e.to_string(),
                }],
            };
            for event in events {
                tokio::select! {
                    _ = token.cancelled() => return,
                    sent = tx.send(event) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Self {
            rx,
            cancel,
            producer: Some(producer),
        }
    }

    /// Next event, or `None` once the stream is exhausted or cancelled.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.rx.recv().await
    }

    /// Stop generation. Pending and future items are dropped.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.producer.take() {
            handle.abort();
        }
        self.rx.close();
    }

    /// `true` after `cancel`.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that is cancelled when this stream is dropped or cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain the stream into a [`WorkerOutput`]. A stream that ends without
    /// `Done` or `Error` yields `Cancelled`.
    pub async fn collect_output(mut self) -> DworkersResult<WorkerOutput> {
        while let Some(event) = self.next_event().await {
            match event {
                StreamEvent::Delta { .. } => {}
                StreamEvent::Done { output } => return Ok(WorkerOutput::success(output)),
                StreamEvent::Error { message } => return Ok(WorkerOutput::failure(message)),
            }
        }
        Err(DworkersError::Cancelled)
    }

    /// Concatenate every delta until the stream finishes.
    pub async fn collect_text(mut self) -> DworkersResult<String> {
        let mut text = String::new();
        while let Some(event) = self.next_event().await {
            match event {
                StreamEvent::Delta { text: delta } => text.push_str(&delta),
                StreamEvent::Done { .. } => return Ok(text),
                StreamEvent::Error { message } => return Err(DworkersError::Worker(message)),
            }
        }
        Err(DworkersError::Cancelled)
    }
}

impl futures_util::Stream for WorkerStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

impl Drop for WorkerStream {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.producer.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn words(mode: StreamMode) -> WorkerStream {
        WorkerStream::spawn(mode, |sink| async move {
            for w in ["alpha ", "beta ", "gamma"] {
                sink.send(w).await?;
            }
            Ok(WorkerOutput::success("alpha beta gamma"))
        })
    }

    #[tokio::test]
    async fn test_incremental_yields_each_delta() {
        let events: Vec<StreamEvent> = words(StreamMode::Incremental).collect().await;
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            StreamEvent::Delta {
                text: "alpha ".into()
            }
        );
        assert_eq!(
            events[3],
            StreamEvent::Done {
                output: serde_json::json!("alpha beta gamma")
            }
        );
    }

    #[tokio::test]
    async fn test_buffered_yields_single_delta() {
        let mut stream = words(StreamMode::Buffered);
        assert_eq!(
            stream.next_event().await,
            Some(StreamEvent::Delta {
                text: "alpha beta gamma".into()
            })
        );
        assert!(matches!(
            stream.next_event().await,
            Some(StreamEvent::Done { .. })
        ));
        assert_eq!(stream.next_event().await, None);
    }

    #[tokio::test]
    async fn test_collect_text() {
        let text = words(StreamMode::Incremental).collect_text().await.unwrap();
        assert_eq!(text, "alpha beta gamma");
    }

    #[tokio::test]
    async fn test_failed_output_becomes_error_event() {
        let stream = WorkerStream::spawn(StreamMode::Incremental, |_sink| async move {
            Ok(WorkerOutput::failure("model unavailable"))
        });
        let output = stream.collect_output().await.unwrap();
        assert!(!output.success);
        assert_eq!(output.error.as_deref(), Some("model unavailable"));
    }

    #[tokio::test]
    async fn test_backpressure_producer_waits_for_consumer() {
        let produced = Arc::new(AtomicUsize::new(0));
        let counter = produced.clone();
        let mut stream = WorkerStream::spawn(StreamMode::Incremental, move |sink| async move {
            for i in 0..100 {
                sink.send(format!("{i}")).await?;
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(WorkerOutput::success("done"))
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        // One item sits in the channel, the producer is parked on the next.
        assert!(produced.load(Ordering::SeqCst) <= 2);

        stream.next_event().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(produced.load(Ordering::SeqCst) <= 3);
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_drop_stops_producer() {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(stopped.clone());
        let stream = WorkerStream::spawn(StreamMode::Incremental, move |sink| async move {
            let _flag = flag;
            while sink.send("tick").await.is_ok() {}
            Ok(WorkerOutput::failure("consumer gone"))
        });
        let token = stream.cancellation_token();

        drop(stream);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(token.is_cancelled());
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_ends_stream() {
        let mut stream = WorkerStream::spawn(StreamMode::Incremental, |sink| async move {
            while sink.send("tick").await.is_ok() {}
            Ok(WorkerOutput::failure("consumer gone"))
        });
        assert!(stream.next_event().await.is_some());
        stream.cancel();
        assert!(stream.is_cancelled());
        assert_eq!(stream.next_event().await, None);
    }
}
