//! Newline-delimited JSON transport
//!
//! One message per line in both directions. `serve` keeps reading host
//! messages while runs execute, and exits once the host closes its side and
//! every in-flight run has finished and had its messages written.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{Bridge, CoreMessage};
use crate::sandbox::RunAttempt;

pub async fn serve<R, W>(
    bridge: Bridge,
    reader: R,
    mut writer: W,
    mut outbox: UnboundedReceiver<CoreMessage>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!(uid = %bridge.uid(), "serving host messages");
    let mut lines = reader.lines();
    let mut runs: JoinSet<RunAttempt> = JoinSet::new();
    let mut host_open = true;

    loop {
        if !host_open && runs.is_empty() {
            while let Ok(message) = outbox.try_recv() {
                write_message(&bridge, &mut writer, &message).await?;
            }
            break;
        }

        tokio::select! {
            line = lines.next_line(), if host_open => {
                match line.context("Failed to read host message")? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        if let Err(err) = bridge.handle_line(&line, &mut runs) {
                            warn!(error = %err, "ignoring host message");
                        }
                    }
                    None => {
                        debug!("host closed input");
                        host_open = false;
                    }
                }
            }
            Some(joined) = runs.join_next(), if !runs.is_empty() => {
                match joined {
                    Ok(attempt) => debug!(?attempt, "run task finished"),
                    Err(err) => warn!(error = %err, "run task failed"),
                }
            }
            message = outbox.recv() => match message {
                Some(message) => write_message(&bridge, &mut writer, &message).await?,
                None => break,
            },
        }
    }

    writer.flush().await?;
    info!("host session ended");
    Ok(())
}

async fn write_message<W>(bridge: &Bridge, writer: &mut W, message: &CoreMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = bridge
        .encode(message)
        .context("Failed to encode core message")?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
