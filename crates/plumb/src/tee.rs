//! Output fan-out for a pipeline stage.
//!
//! Each stage's stdout is owned by a `Tee`: consumers (downstream stdins,
//! file sinks, arbitrary writers) subscribe, and a single pump task reads
//! chunks and duplicates each one to every subscriber. Raw OS handles never
//! leave this module; connection is an exchange of opaque writers.
//!
//! ```text
//!   ChildStdout ──▶ [pump task] ──▶ consumer 0 (downstream stdin)
//!                        │........▶ consumer 1 (file sink)
//!                        │........▶ consumer n
//! ```
//!
//! The pump starts lazily on the first subscription and is spawned, not
//! polled, by the subscribing call, so every consumer registered before
//! the caller's next await point observes the full stream. A consumer that
//! fails with a broken pipe is dropped and logged; the others keep
//! receiving. Per-consumer completion (final flush) is published through a
//! watch cell so any number of waiters can observe it.

use std::io;
use std::mem;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::ChildStdout;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::report::SinkStatus;

/// Read granularity for the pump, and the unit of duplication to
/// consumers. Matches a typical stdio buffer.
pub const PIPE_CHUNK_SIZE: usize = 8 * 1024;

pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A consumer's writing end, possibly not opened yet. Files are opened by
/// the pump so the connect call never blocks; truncation/creation still
/// happens even when the stream turns out to be empty.
pub(crate) enum SinkWriter {
    PendingFile { path: PathBuf, append: bool },
    Ready(BoxedWriter),
}

/// Completion handle for one subscribed consumer. Cloneable; every clone's
/// `wait` resolves once the consumer settles.
#[derive(Clone)]
pub(crate) struct SinkTicket {
    destination: String,
    done: watch::Receiver<Option<SinkStatus>>,
}

impl SinkTicket {
    pub(crate) fn destination(&self) -> &str {
        &self.destination
    }

    pub(crate) async fn wait(&self) -> SinkStatus {
        let mut done = self.done.clone();
        match done.wait_for(|status| status.is_some()).await {
            Ok(status) => status.clone().unwrap_or(SinkStatus::Flushed),
            // The pump task can only vanish without settling if it panicked.
            Err(_) => SinkStatus::WriteFailed {
                kind: io::ErrorKind::Other,
                message: "output pump dropped before settling".into(),
            },
        }
    }
}

struct Consumer {
    writer: SinkWriter,
    label: String,
    done: watch::Sender<Option<SinkStatus>>,
}

impl Consumer {
    fn settle(&self, status: SinkStatus) {
        self.done.send_replace(Some(status));
    }

    /// Open a pending file destination. No-op once ready.
    async fn ensure_open(&mut self) -> Result<(), SinkStatus> {
        if let SinkWriter::PendingFile { path, append } = &self.writer {
            let mut options = OpenOptions::new();
            options.write(true).create(true);
            if *append {
                options.append(true);
            } else {
                options.truncate(true);
            }
            match options.open(path).await {
                Ok(file) => self.writer = SinkWriter::Ready(Box::new(file)),
                Err(e) => {
                    return Err(SinkStatus::OpenFailed {
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), SinkStatus> {
        self.ensure_open().await?;
        if let SinkWriter::Ready(writer) = &mut self.writer {
            writer.write_all(chunk).await.map_err(|e| SinkStatus::WriteFailed {
                kind: e.kind(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Flush, settle, and drop. Dropping the writer is what closes the fd,
    /// which is how a downstream stdin observes EOF.
    async fn finish(mut self) {
        match self.ensure_open().await {
            Ok(()) => {
                let status = match &mut self.writer {
                    SinkWriter::Ready(writer) => match writer.shutdown().await {
                        Ok(()) => SinkStatus::Flushed,
                        Err(e) => SinkStatus::WriteFailed {
                            kind: e.kind(),
                            message: e.to_string(),
                        },
                    },
                    SinkWriter::PendingFile { .. } => SinkStatus::Flushed,
                };
                self.settle(status);
            }
            Err(status) => self.settle(status),
        }
    }
}

struct TeeInner {
    /// Producing program name, for logs and warning text.
    label: String,
    source: Mutex<Option<ChildStdout>>,
    /// Consumers waiting to be adopted by the pump.
    pending: Mutex<Vec<Consumer>>,
    started: AtomicBool,
    finished: AtomicBool,
    /// Non-fatal conditions (broken pipes, read errors) swallowed in
    /// transit; collected into the chain result.
    warnings: Mutex<Vec<String>>,
}

pub(crate) struct Tee {
    inner: Arc<TeeInner>,
}

impl Tee {
    /// `source` is `None` when the stage never spawned; consumers then see
    /// an immediate EOF (file sinks are still created, empty).
    pub(crate) fn new(source: Option<ChildStdout>, label: String) -> Self {
        Self {
            inner: Arc::new(TeeInner {
                label,
                source: Mutex::new(source),
                pending: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                warnings: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a consumer for an independent copy of the stream.
    pub(crate) fn subscribe(&self, writer: SinkWriter, destination: String) -> SinkTicket {
        let (done_tx, done_rx) = watch::channel(None);
        let consumer = Consumer {
            writer,
            label: destination.clone(),
            done: done_tx,
        };
        debug!(source = %self.inner.label, dest = %destination, "attached output consumer");

        // The finished check shares the pending lock with the pump's final
        // drain, so a consumer is either adopted by the pump or settled
        // here, never lost between the two.
        let late = {
            let mut pending = lock(&self.inner.pending);
            if self.inner.finished.load(Ordering::Acquire) {
                Some(consumer)
            } else {
                pending.push(consumer);
                None
            }
        };
        match late {
            // The stream is already over; the late consumer gets EOF.
            Some(consumer) => {
                tokio::spawn(consumer.finish());
            }
            None => self.start_pump(),
        }

        SinkTicket {
            destination,
            done: done_rx,
        }
    }

    /// Attach a discarding consumer if nothing ever subscribed, so an
    /// awaited tail cannot deadlock on a full OS pipe buffer.
    pub(crate) fn drain_if_unconsumed(&self) {
        if !self.inner.started.load(Ordering::Acquire) {
            let _ = self.subscribe(
                SinkWriter::Ready(Box::new(tokio::io::sink())),
                "<discard>".to_string(),
            );
        }
    }

    pub(crate) fn warnings(&self) -> Vec<String> {
        lock(&self.inner.warnings).clone()
    }

    fn start_pump(&self) {
        if !self.inner.started.swap(true, Ordering::SeqCst) {
            tokio::spawn(pump(Arc::clone(&self.inner)));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

async fn pump(inner: Arc<TeeInner>) {
    let source = lock(&inner.source).take();
    let mut active: Vec<Consumer> = Vec::new();

    if let Some(mut stdout) = source {
        let mut buf = vec![0u8; PIPE_CHUNK_SIZE];
        loop {
            active.append(&mut lock(&inner.pending));
            let n = match stdout.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    lock(&inner.warnings)
                        .push(format!("reading {} output failed: {}", inner.label, e));
                    break;
                }
            };
            deliver(&inner, &mut active, &buf[..n]).await;
        }
    }

    // Close the subscription window under the pending lock, then settle
    // everything adopted so far. Later subscribers see `finished` and are
    // settled by `subscribe` itself.
    let mut leftovers = {
        let mut pending = lock(&inner.pending);
        inner.finished.store(true, Ordering::Release);
        mem::take(&mut *pending)
    };
    active.append(&mut leftovers);
    for consumer in active.drain(..) {
        consumer.finish().await;
    }
}

/// Write one chunk to every active consumer, dropping the ones that fail.
async fn deliver(inner: &TeeInner, active: &mut Vec<Consumer>, chunk: &[u8]) {
    let mut i = 0;
    while i < active.len() {
        match active[i].write_chunk(chunk).await {
            Ok(()) => i += 1,
            Err(status) => {
                let consumer = active.swap_remove(i);
                if matches!(
                    &status,
                    SinkStatus::WriteFailed { kind, .. } if *kind == io::ErrorKind::BrokenPipe
                ) {
                    // Conventional pipe semantics: the downstream went away,
                    // the upstream keeps producing.
                    warn!(source = %inner.label, dest = %consumer.label, "broken pipe, dropping consumer");
                    lock(&inner.warnings)
                        .push(format!("{} → {}: broken pipe", inner.label, consumer.label));
                } else {
                    warn!(source = %inner.label, dest = %consumer.label, "consumer failed, dropping");
                }
                consumer.settle(status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sourceless_tee_settles_consumers_with_eof() {
        let tee = Tee::new(None, "ghost".into());
        let (client, mut server) = tokio::io::duplex(64);
        let ticket = tee.subscribe(SinkWriter::Ready(Box::new(client)), "mem".into());

        assert_eq!(ticket.wait().await, SinkStatus::Flushed);

        let mut collected = Vec::new();
        server.read_to_end(&mut collected).await.unwrap();
        assert!(collected.is_empty());
    }

    #[tokio::test]
    async fn late_subscription_after_finish_settles() {
        let tee = Tee::new(None, "ghost".into());
        let first = tee.subscribe(
            SinkWriter::Ready(Box::new(tokio::io::sink())),
            "a".into(),
        );
        first.wait().await;

        let second = tee.subscribe(
            SinkWriter::Ready(Box::new(tokio::io::sink())),
            "b".into(),
        );
        assert_eq!(second.wait().await, SinkStatus::Flushed);
    }

    #[tokio::test]
    async fn pending_file_is_created_even_for_empty_stream() {
        let dir = std::env::temp_dir().join(format!("plumb-tee-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("empty.out");

        let tee = Tee::new(None, "ghost".into());
        let ticket = tee.subscribe(
            SinkWriter::PendingFile { path: path.clone(), append: false },
            path.display().to_string(),
        );
        assert_eq!(ticket.wait().await, SinkStatus::Flushed);
        assert_eq!(std::fs::read(&path).unwrap(), b"");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn open_failure_is_reported() {
        let tee = Tee::new(None, "ghost".into());
        let ticket = tee.subscribe(
            SinkWriter::PendingFile {
                path: PathBuf::from("/nonexistent-dir-plumb/out.txt"),
                append: false,
            },
            "bad".into(),
        );
        match ticket.wait().await {
            SinkStatus::OpenFailed { kind, .. } => assert_eq!(kind, io::ErrorKind::NotFound),
            other => panic!("expected OpenFailed, got {other:?}"),
        }
    }
}
