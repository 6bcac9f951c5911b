//! Async stream line readers (non-UTF8-safe).
//!
//! The proxy is a Node.js program and may emit arbitrary bytes. Using
//! `BufReader::lines()` would terminate the reader on invalid UTF-8, so lines
//! are read as bytes and decoded lossily.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Spawn a task forwarding each line of `stream` to `tx`.
///
/// The task keeps draining the stream after the receiver is gone so the
/// child never blocks on a full pipe; it exits at EOF or on a read error.
pub(crate) fn spawn_stream_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    pid: Option<u32>,
    stream_type: &'static str,
    tx: UnboundedSender<String>,
) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    let line = decode_line(&buf);
                    debug!(pid = ?pid, %stream_type, "{}: {}", stream_type, line);
                    // Receiver dropped once the launch is decided; keep draining.
                    let _ = tx.send(line);
                }
                Err(e) => {
                    debug!(pid = ?pid, %stream_type, error = %e, "stream reader exiting due to read error");
                    break;
                }
            }
        }

        debug!(pid = ?pid, %stream_type, "stream reader task exiting");
    });
}

/// Trim trailing `\n` / `\r\n` and decode lossily.
fn decode_line(buf: &[u8]) -> String {
    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && buf[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
