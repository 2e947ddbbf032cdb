use std::fmt::Display;

use futures::{Stream, StreamExt as _, stream};

use crate::errors::TransportError;

/// Incremental UTF-8 decoder for network byte chunks.
///
/// A multi-byte character split across two reads is held back until its
/// remaining bytes arrive; invalid sequences become U+FFFD.
#[derive(Default)]
pub(crate) struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let out = text.to_string();
                self.pending.clear();
                out
            }
            Err(err) => {
                let valid = err.valid_up_to();
                match err.error_len() {
                    // Incomplete sequence at the end: wait for more bytes.
                    None => {
                        let out = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
                        self.pending.drain(..valid);
                        out
                    }
                    Some(bad) => {
                        let mut out =
                            String::from_utf8_lossy(&self.pending[..valid + bad]).into_owned();
                        self.pending.drain(..valid + bad);
                        out.push_str(&self.push(&[]));
                        out
                    }
                }
            }
        }
    }

    /// Flushes bytes still held back when the stream closes.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

/// Adapts a response byte stream into decoded text chunks.
///
/// A read error ends the stream after being yielded once.
pub(crate) fn text_chunks<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, TransportError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    struct State<S> {
        bytes: S,
        decoder: Utf8ChunkDecoder,
        done: bool,
    }

    stream::unfold(
        State {
            bytes,
            decoder: Utf8ChunkDecoder::default(),
            done: false,
        },
        |mut state| async move {
            if state.done {
                return None;
            }
            loop {
                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        let text = state.decoder.push(chunk.as_ref());
                        if text.is_empty() {
                            continue;
                        }
                        return Some((Ok(text), state));
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((Err(TransportError::Read(e.to_string())), state));
                    }
                    None => {
                        state.done = true;
                        let tail = state.decoder.finish();
                        if tail.is_empty() {
                            return None;
                        }
                        return Some((Ok(tail), state));
                    }
                }
            }
        },
    )
}
