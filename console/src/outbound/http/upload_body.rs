//! Chunked multipart file body that reports progress as it is sent.

use std::io;

use futures_util::stream::{self, Stream, StreamExt};

use crate::domain::ports::ProgressReporter;

const CHUNK_BYTES: usize = 64 * 1024;

/// Split `bytes` into chunks, reporting cumulative progress as each chunk is
/// handed to the connection.
pub(super) fn progress_stream(
    bytes: Vec<u8>,
    reporter: ProgressReporter,
) -> impl Stream<Item = Result<Vec<u8>, io::Error>> + Send + 'static {
    let total = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
    let chunks: Vec<Vec<u8>> = bytes.chunks(CHUNK_BYTES).map(<[u8]>::to_vec).collect();
    let mut sent = 0_u64;
    stream::iter(chunks).map(move |chunk| {
        sent = sent.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
        reporter.report(sent, total);
        Ok(chunk)
    })
}
