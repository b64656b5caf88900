//! Server-sent events parsing shared by the HTTP backends
//!
//! Network chunks do not respect line boundaries, so `data:` lines are
//! reassembled here before any JSON is parsed.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};

use super::{BackendError, ByteStream};

/// What a backend found inside one `data:` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsePayload {
    /// Generated text to forward
    Text(String),
    /// End-of-stream marker (e.g., `[DONE]`)
    Done,
    /// Keep-alive or metadata without text
    Skip,
}

/// Incremental splitter turning byte chunks into SSE `data:` payloads
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning the payloads of every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(data) = Self::data_payload(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush a final line that was not newline-terminated
    pub fn finish(&mut self) -> Vec<String> {
        let line = std::mem::take(&mut self.pending);
        Self::data_payload(&line).into_iter().collect()
    }

    fn data_payload(line: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(['\r', '\n']);
        let data = line.strip_prefix("data:")?;
        Some(data.strip_prefix(' ').unwrap_or(data).to_string())
    }
}

struct SseState<E> {
    inner: Pin<Box<dyn Stream<Item = Result<Vec<u8>, BackendError>> + Send>>,
    lines: SseLineBuffer,
    pending: VecDeque<String>,
    extract: E,
    finished: bool,
}

/// Turn an SSE byte stream into a stream of generated text bytes.
///
/// `extract` maps each `data:` payload to text; the stream ends at the first
/// [`SsePayload::Done`] or when the underlying stream ends.
pub fn text_stream<S, E>(bytes: S, extract: E) -> ByteStream
where
    S: Stream<Item = Result<Vec<u8>, BackendError>> + Send + 'static,
    E: Fn(&str) -> Result<SsePayload, BackendError> + Send + 'static,
{
    let state = SseState {
        inner: Box::pin(bytes),
        lines: SseLineBuffer::new(),
        pending: VecDeque::new(),
        extract,
        finished: false,
    };

    let stream = futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(data) = st.pending.pop_front() {
                match (st.extract)(&data) {
                    Ok(SsePayload::Text(text)) if !text.is_empty() => {
                        return Some((Ok(text.into_bytes()), st));
                    }
                    Ok(SsePayload::Text(_)) | Ok(SsePayload::Skip) => continue,
                    Ok(SsePayload::Done) => return None,
                    Err(e) => {
                        st.finished = true;
                        st.pending.clear();
                        return Some((Err(e), st));
                    }
                }
            }

            if st.finished {
                return None;
            }

            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    let payloads = st.lines.push(&chunk);
                    st.pending.extend(payloads);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.finished = true;
                    let rest = st.lines.finish();
                    st.pending.extend(rest);
                }
            }
        }
    });

    Box::pin(stream)
}

/// Adapt a `reqwest` response body to the byte stream `text_stream` expects
pub fn response_bytes(
    response: reqwest::Response,
) -> impl Stream<Item = Result<Vec<u8>, BackendError>> + Send + 'static {
    response
        .bytes_stream()
        .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| BackendError::Http(e.without_url())))
}
