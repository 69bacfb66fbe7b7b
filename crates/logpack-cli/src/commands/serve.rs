//! `logpack serve` command implementation
//!
//! Exposes one orchestrator over stdio: each stdin line is a JSON
//! `CallerMessage`, each stdout line a JSON `OrchestratorMessage`. Lines that
//! fail to decode are answered with an `error` message and otherwise ignored.
//! The orchestrator is disposed on `dispose` or at end of input.

use crate::error::Result;
use anyhow::Context;
use logpack_engine::api::PackClient;
use logpack_engine::orchestrator;
use logpack_engine::protocol::{CallerMessage, OrchestratorMessage};
use logpack_engine::SessionConfig;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

/// Write messages as JSON lines until every sender is gone
async fn write_lines<W>(mut messages: UnboundedReceiver<OrchestratorMessage>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = messages.recv().await {
        let line = match message.encode() {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to encode reply");
                continue;
            },
        };
        writer
            .write_all(line.as_bytes())
            .await
            .context("Failed to write to stdout")?;
        writer.write_all(b"\n").await.context("Failed to write to stdout")?;
        writer.flush().await.context("Failed to flush stdout")?;
    }
    Ok(())
}

/// Serve the protocol over an arbitrary reader and writer
pub async fn serve<R, W>(reader: R, writer: W, config: SessionConfig) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let client = PackClient::new(&config)?;
    let (mut handle, mut replies) = orchestrator::spawn(client);

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let forward_tx = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(message) = replies.recv().await {
            if forward_tx.send(message).is_err() {
                break;
            }
        }
    });
    let writer = tokio::spawn(write_lines(out_rx, writer));

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.context("Failed to read from stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match CallerMessage::decode(line) {
            Ok(CallerMessage::Dispose) => {
                debug!("Dispose requested");
                break;
            },
            Ok(message) => {
                if handle.send(message).is_err() {
                    warn!("Orchestrator stopped, ending session");
                    break;
                }
            },
            Err(e) => {
                debug!(error = %e, "Rejecting caller message");
                let _ = out_tx.send(OrchestratorMessage::error(e.to_string()));
            },
        }
    }

    let _ = handle.send(CallerMessage::Dispose);
    handle.join().await;
    drop(out_tx);
    let _ = forwarder.await;
    writer.await.context("Output task panicked")??;

    info!("Serve session ended");
    Ok(())
}

/// Run the serve command on stdin/stdout
pub async fn run(config: SessionConfig) -> Result<()> {
    serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), config).await
}
