//! JSON-lines transport over stdin/stdout.
//!
//! Each line on stdin is one inbound envelope; acknowledgements and replies
//! are written to stdout, one per line, from a single writer task so lines
//! never interleave. Logs go to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use parley::Envelope;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::session::{ChannelOutbox, SessionHandler};

/// Bound on envelopes read ahead of the handler
const INBOX_CAPACITY: usize = 64;

/// Serve the chat protocol over stdin/stdout until EOF.
pub async fn run(build: impl FnOnce(ChannelOutbox) -> SessionHandler) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve(stdin, stdout, build).await
}

/// Serve over any line reader and writer.
pub async fn serve<R, W>(
    reader: R,
    writer: W,
    build: impl FnOnce(ChannelOutbox) -> SessionHandler,
) -> Result<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbox, outbound) = ChannelOutbox::new();
    let handler = Arc::new(build(outbox));

    let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
    let writer_task = tokio::spawn(write_lines(outbound, writer));
    let reader_task = tokio::spawn(read_lines(reader, inbox_tx));

    info!("Stdio chat transport running");

    // Returns once the reader hits EOF and all turns finish; that drops the
    // handler and with it the last outbox sender, which ends the writer.
    handler.run(inbox_rx).await;

    reader_task.await.context("Reader task panicked")??;
    writer_task.await.context("Writer task panicked")??;

    info!("Stdio chat transport shutdown");
    Ok(())
}

async fn read_lines<R>(reader: R, inbox: mpsc::Sender<Envelope>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        match Envelope::from_json_line(&line) {
            Ok(envelope) => {
                if inbox.send(envelope).await.is_err() {
                    break;
                }
            }
            // No sender to reply to
            Err(e) => warn!(error = %e, "Skipping undecodable frame"),
        }
    }
    Ok(())
}

async fn write_lines<W>(mut outbound: mpsc::UnboundedReceiver<Envelope>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = outbound.recv().await {
        let mut line = envelope.to_json_line()?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .context("Failed to write stdout")?;
        writer.flush().await.context("Failed to flush stdout")?;
    }
    Ok(())
}
