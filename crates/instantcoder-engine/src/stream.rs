//! Streamed response consumption
//!
//! Turns the raw byte stream of a model call into text, publishing the
//! sanitized accumulation after every chunk and returning the final
//! sanitized artifact once the stream ends cleanly.

use std::sync::Arc;

use encoding_rs::{Decoder, DecoderResult, UTF_8};
use futures_util::{Stream, StreamExt};
use instantcoder_inference::BackendError;

use crate::error::StreamFailure;
use crate::sanitize::{FenceSanitizer, Sanitizer};

/// Reads a model byte stream to completion
#[derive(Clone)]
pub struct StreamConsumer {
    sanitizer: Arc<dyn Sanitizer>,
}

impl StreamConsumer {
    pub fn new(sanitizer: Arc<dyn Sanitizer>) -> Self {
        Self { sanitizer }
    }

    /// Consume `stream`, calling `on_partial` with the sanitized text so far
    /// after each chunk.
    ///
    /// Returns the final sanitized text. On failure the raw text decoded so
    /// far travels inside the [`StreamFailure`] and is never returned as a
    /// result.
    pub async fn consume<S, F>(&self, mut stream: S, mut on_partial: F) -> Result<String, StreamFailure>
    where
        S: Stream<Item = Result<Vec<u8>, BackendError>> + Unpin,
        F: FnMut(&str),
    {
        let mut decoder = UTF_8.new_decoder_without_bom_handling();
        let mut buffer = String::new();
        let mut chunks = 0usize;

        while let Some(item) = stream.next().await {
            let bytes = match item {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("[stream] Transport error after {} chunks: {}", chunks, e);
                    return Err(StreamFailure::Transport {
                        message: e.to_string(),
                        partial: buffer,
                    });
                }
            };
            chunks += 1;

            if !decode_into(&mut decoder, &bytes, &mut buffer, false) {
                log::warn!("[stream] Malformed UTF-8 in chunk {}", chunks);
                return Err(StreamFailure::Decode { partial: buffer });
            }

            on_partial(&self.sanitizer.clean(&buffer));
        }

        // Flush; a sequence cut off by the end of the stream is malformed
        if !decode_into(&mut decoder, &[], &mut buffer, true) {
            log::warn!("[stream] Stream ended inside a multi-byte sequence");
            return Err(StreamFailure::Decode { partial: buffer });
        }

        log::debug!("[stream] Finished after {} chunks, {} bytes", chunks, buffer.len());
        Ok(self.sanitizer.clean(&buffer))
    }
}

impl Default for StreamConsumer {
    fn default() -> Self {
        Self::new(Arc::new(FenceSanitizer))
    }
}

/// Decode `src` onto `dst`. Returns false on malformed input.
fn decode_into(decoder: &mut Decoder, mut src: &[u8], dst: &mut String, last: bool) -> bool {
    loop {
        let needed = decoder
            .max_utf8_buffer_length_without_replacement(src.len())
            .unwrap_or(src.len() + 4);
        dst.reserve(needed);

        let (result, read) = decoder.decode_to_string_without_replacement(src, dst, last);
        src = &src[read..];

        match result {
            DecoderResult::InputEmpty => return true,
            DecoderResult::OutputFull => continue,
            DecoderResult::Malformed(_, _) => return false,
        }
    }
}
