//! Build result sources.

use async_stream::stream;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_stream::Stream;

use crate::dev::result::BuildResult;

/// Read one JSON build result per line.
///
/// Blank lines are skipped. A line that does not parse is logged and skipped;
/// the stream ends at end of input or on a read error.
pub fn json_lines<R>(reader: R) -> impl Stream<Item = BuildResult>
where
    R: AsyncBufRead + Unpin,
{
    stream! {
        let mut lines = reader.lines();
        let mut line_number = 0usize;

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Failed to read build results: {}", e);
                    break;
                }
            };
            line_number += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<BuildResult>(trimmed) {
                Ok(result) => yield result,
                Err(e) => tracing::warn!("Skipping malformed build result on line {}: {}", line_number, e),
            }
        }
    }
}
