//! `--events` output: pipeline events as JSON lines.

use std::io::Write;

use tldr_core::PipelineEvent;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::warn;

/// Write every event received on `rx` to `out`, one JSON object per line,
/// until the bus closes. Returns the number of lines written.
///
/// A lagging receiver skips what it missed and keeps going.
pub async fn stream_events<W: Write>(mut rx: Receiver<PipelineEvent>, mut out: W) -> usize {
    let mut written = 0;
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event stream lagged, events dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!(event_type = event.event_type(), error = %e, "failed to serialize event");
                continue;
            }
        };
        if let Err(e) = writeln!(out, "{line}") {
            warn!(error = %e, "failed to write event, stopping event stream");
            break;
        }
        written += 1;
    }
    if let Err(e) = out.flush() {
        warn!(error = %e, "failed to flush event stream");
    }
    written
}
