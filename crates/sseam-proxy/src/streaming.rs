//! SSE stream normalization.
//!
//! Reads the upstream byte stream line by line, routes each line through
//! the event rewriter, and re-emits events with canonical framing: every
//! data event goes out as `data: <json>\n\n`, and every stream ends with
//! exactly one `data: [DONE]\n\n` sentinel, synthesized when the upstream
//! never sent it. Upstream blank lines are dropped; the proxy produces
//! its own event delimiters.

use crate::rewrite::fix_sse_line;
use anyhow::{Context, Result};
use async_stream::try_stream;
use futures::{Stream, StreamExt};

const DONE_EVENT: &[u8] = b"data: [DONE]\n\n";

/// Normalize an upstream SSE byte stream into well-framed events.
///
/// Each yielded item is one wire-ready piece of the response, emitted as
/// soon as its upstream line is complete so downstream clients see prompt
/// delivery. A final partial line without a terminator is still processed.
pub fn normalize_sse<S, B, E>(
    mut upstream: S,
    replacement_model: Option<String>,
) -> impl Stream<Item = Result<Vec<u8>>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin,
    B: AsRef<[u8]> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    try_stream! {
        let mut buffer: Vec<u8> = Vec::new();
        let mut saw_done = false;

        while let Some(chunk) = upstream.next().await {
            let chunk = chunk.context("failed to read upstream stream chunk")?;
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if let Some(out) =
                    emit_line(trim_terminators(&line), replacement_model.as_deref(), &mut saw_done)
                {
                    yield out;
                }
            }
        }

        if !buffer.is_empty() {
            if let Some(out) =
                emit_line(trim_terminators(&buffer), replacement_model.as_deref(), &mut saw_done)
            {
                yield out;
            }
        }

        // Strict parsers require an explicit terminator even when the
        // upstream ended the stream without one.
        if !saw_done {
            yield DONE_EVENT.to_vec();
        }
    }
}

/// Produce the wire bytes for one upstream line.
///
/// Returns `None` for blank lines: the proxy writes its own delimiter
/// after every data event, so upstream delimiters would double up.
fn emit_line(line: &[u8], replacement_model: Option<&str>, saw_done: &mut bool) -> Option<Vec<u8>> {
    if line.is_empty() {
        return None;
    }
    if is_done_sentinel(line) {
        *saw_done = true;
        return Some(DONE_EVENT.to_vec());
    }

    let mut fixed = fix_sse_line(line, replacement_model);
    let is_data = fixed.starts_with(b"data: ");
    fixed.push(b'\n');
    if is_data {
        // Blank line after data lines to delimit SSE events.
        fixed.push(b'\n');
    }
    Some(fixed)
}

/// Both sentinel spellings seen in the wild are accepted.
fn is_done_sentinel(line: &[u8]) -> bool {
    line == b"data: [DONE]" || line == b"data:[DONE]"
}

fn trim_terminators(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}
