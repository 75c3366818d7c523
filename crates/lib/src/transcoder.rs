//! # Streaming Transcoder
//!
//! Launches the catalog tool, reads its XML as it is produced and pushes each
//! flattened record into the response body as soon as its table is decoded.
//!
//! ## Data Flow
//!
//! ```text
//! [ToolLauncher] --stdout--> [CatalogReader] --Table--> [TagArrayEncoder]
//!                                                              |
//!                                                      mpsc::Sender<Bytes>
//!                                                              |
//!                                                              v
//!                                                  [TagStream] --> HTTP body
//! ```
//!
//! ## Cancellation
//!
//! The caller passes in the request's cancellation token. The pump runs on a
//! child of that token and the returned [`TagStream`] holds a drop guard for
//! the parent, so dropping the response body (client disconnect) cancels the
//! pump, which then kills the tool. The tool is always reaped on a detached
//! task so the response path never waits for it.

use crate::catalog::CatalogReader;
use crate::encoder::TagArrayEncoder;
use crate::errors::{CatalogError, ProcessError, TranscodeError};
use crate::process::{ToolLauncher, ToolProcess};
use bytes::Bytes;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

/// Default number of encoded chunks buffered between the pump and the body.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// How a transcoding run ended.
#[derive(Debug)]
pub enum TranscodeOutcome {
    /// The tool's output was exhausted and the array was closed.
    Completed { records: usize, tables_skipped: usize },
    /// The request was cancelled or the body receiver went away.
    Cancelled { records: usize },
    /// The XML stream broke; the body ends without its closing characters.
    Failed { records: usize, error: CatalogError },
}

/// Turns the catalog tool's output into a streamed JSON response body.
#[derive(Debug, Clone)]
pub struct Transcoder {
    launcher: Arc<dyn ToolLauncher>,
    channel_capacity: usize,
}

impl Transcoder {
    pub fn new(launcher: Arc<dyn ToolLauncher>) -> Self {
        Self {
            launcher,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Starts the tool and returns the body stream.
    ///
    /// The tool is started before anything is written, so a startup failure
    /// is returned here while the caller can still choose the status code.
    pub async fn stream(&self, cancel: CancellationToken) -> Result<TagStream, TranscodeError> {
        let program = self.launcher.program().to_string();
        let mut process = self.launcher.launch().await?;

        let Some(stdout) = process.take_stdout() else {
            if let Err(e) = process.kill() {
                warn!(program = %program, "Failed to kill tool without stdout: {e}");
            }
            reap(process, program.clone(), true);
            return Err(ProcessError::MissingStdout(program).into());
        };

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let scope = cancel.child_token();

        tokio::spawn(async move {
            match transcode(process, stdout, tx, scope, program.clone()).await {
                TranscodeOutcome::Completed {
                    records,
                    tables_skipped,
                } => info!(program = %program, records, tables_skipped, "Tag catalog streamed"),
                TranscodeOutcome::Cancelled { records } => {
                    info!(program = %program, records, "Tag stream cancelled by client")
                }
                TranscodeOutcome::Failed { records, error } => {
                    error!(program = %program, records, "Tag stream aborted: {error}")
                }
            }
        });

        Ok(TagStream {
            chunks: ReceiverStream::new(rx),
            _request: cancel.drop_guard(),
        })
    }
}

/// The response body: encoded chunks in document order.
///
/// Dropping it cancels the request scope the pump runs under.
pub struct TagStream {
    chunks: ReceiverStream<Bytes>,
    _request: DropGuard,
}

impl Stream for TagStream {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().chunks)
            .poll_next(cx)
            .map(|chunk| chunk.map(Ok))
    }
}

/// Runs one transcoding pass to completion, cancellation or failure.
///
/// Whatever the outcome, the process is handed to a detached reaper before
/// this returns; on cancellation or a broken stream it is killed first.
pub async fn transcode<R>(
    mut process: Box<dyn ToolProcess>,
    output: R,
    tx: mpsc::Sender<Bytes>,
    scope: CancellationToken,
    program: String,
) -> TranscodeOutcome
where
    R: AsyncRead + Unpin,
{
    let mut reader = CatalogReader::from_output(output);
    let mut encoder = TagArrayEncoder::new();
    let mut tables_skipped = 0usize;

    let outcome = 'stream: {
        if !send(&tx, &scope, encoder.open()).await {
            break 'stream TranscodeOutcome::Cancelled { records: 0 };
        }

        loop {
            let next = tokio::select! {
                biased;
                _ = scope.cancelled() => {
                    break 'stream TranscodeOutcome::Cancelled { records: encoder.written() };
                }
                next = reader.next_table() => next,
            };

            match next {
                Ok(Some(table)) => {
                    for record in table.records() {
                        let chunk = match encoder.encode(&record) {
                            Ok(chunk) => chunk,
                            Err(e) => {
                                error!(path = %record.path, "Failed to encode record: {e}");
                                continue;
                            }
                        };
                        if !send(&tx, &scope, chunk).await {
                            break 'stream TranscodeOutcome::Cancelled {
                                records: encoder.written(),
                            };
                        }
                    }
                }
                Ok(None) => {
                    let records = encoder.written();
                    break 'stream if send(&tx, &scope, encoder.close()).await {
                        TranscodeOutcome::Completed {
                            records,
                            tables_skipped,
                        }
                    } else {
                        TranscodeOutcome::Cancelled { records }
                    };
                }
                Err(e) if e.is_recoverable() => {
                    warn!(program = %program, "Skipping table: {e}");
                    tables_skipped += 1;
                }
                Err(error) => {
                    break 'stream TranscodeOutcome::Failed {
                        records: encoder.written(),
                        error,
                    };
                }
            }
        }
    };

    let killed = !matches!(outcome, TranscodeOutcome::Completed { .. });
    if killed {
        debug!(program = %program, "Killing catalog tool");
        if let Err(e) = process.kill() {
            warn!(program = %program, "Failed to kill catalog tool: {e}");
        }
    }
    reap(process, program, killed);

    outcome
}

/// Sends one chunk unless the scope is cancelled first. Returns `false` when
/// the chunk could not be delivered.
async fn send(tx: &mpsc::Sender<Bytes>, scope: &CancellationToken, chunk: Bytes) -> bool {
    tokio::select! {
        biased;
        _ = scope.cancelled() => false,
        sent = tx.send(chunk) => sent.is_ok(),
    }
}

/// Waits for the process on a detached task so it never lingers as a zombie.
fn reap(mut process: Box<dyn ToolProcess>, program: String, killed: bool) {
    tokio::spawn(async move {
        match process.wait().await {
            Ok(report) if report.success => debug!(program = %program, "Catalog tool exited"),
            Ok(report) if killed => debug!(program = %program, "Catalog tool terminated ({report})"),
            Ok(report) => error!(program = %program, "Catalog tool exited with {report}"),
            Err(e) => error!(program = %program, "Error waiting for catalog tool: {e}"),
        }
    });
}
