//! Re-segmentation of a chunked response body into event-stream frames.
//!
//! Transport chunks carry no relation to event boundaries: a chunk may hold
//! several frames, half a frame, or half of a multi-byte character. Bytes are
//! buffered raw and split on the blank-line delimiter before decoding. The
//! delimiter is pure ASCII and can never occur inside a multi-byte UTF-8
//! sequence, so every emitted frame holds only whole characters no matter
//! where the transport cut the stream.

use futures_util::stream::{self, Stream, StreamExt};
use memchr::memmem;
use tracing::warn;

const FRAME_DELIMITER: &[u8] = b"\n\n";

/// Buffers body bytes across chunks and hands out complete frames.
///
/// One decoder per stream; it is not meant to be reused after
/// [`FrameDecoder::finish`].
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Offset where the next delimiter search starts; bytes before it are
    /// known not to contain a delimiter.
    scan_from: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transport chunk without extracting frames.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Append a transport chunk and drain every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.extend(chunk);
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    /// Remove and return the next complete frame, if the buffer holds one.
    /// The delimiter itself is dropped.
    pub fn next_frame(&mut self) -> Option<String> {
        match memmem::find(&self.buffer[self.scan_from..], FRAME_DELIMITER) {
            Some(relative) => {
                let end = self.scan_from + relative;
                let frame = decode_frame(&self.buffer[..end]);
                self.buffer.drain(..end + FRAME_DELIMITER.len());
                self.scan_from = 0;
                Some(frame)
            }
            None => {
                // A trailing '\n' may pair with the first byte of the next chunk.
                self.scan_from = self.buffer.len().saturating_sub(FRAME_DELIMITER.len() - 1);
                None
            }
        }
    }

    /// Flush the remainder at end of stream. Whitespace-only leftovers are
    /// discarded.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        self.scan_from = 0;
        let frame = decode_frame(&rest);
        if frame.trim().is_empty() {
            None
        } else {
            Some(frame)
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    fn discard(&mut self) {
        self.buffer.clear();
        self.scan_from = 0;
    }
}

fn decode_frame(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_owned(),
        Err(err) => {
            warn!(error = %err, "Invalid UTF-8 in event stream frame; substituting replacement characters");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

struct FrameState<S> {
    body: S,
    decoder: FrameDecoder,
    exhausted: bool,
}

/// Lazily turn a body stream into a stream of frames.
///
/// The returned stream ends when the body ends (after flushing a trailing
/// partial frame) or right after yielding the first body error.
pub fn frames<S, B, E>(body: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let state = FrameState {
        body,
        decoder: FrameDecoder::new(),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.decoder.next_frame() {
                return Some((Ok(frame), state));
            }
            if state.exhausted {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => state.decoder.extend(chunk.as_ref()),
                Some(Err(err)) => {
                    state.exhausted = true;
                    state.decoder.discard();
                    return Some((Err(err), state));
                }
                None => {
                    state.exhausted = true;
                    let frame = state.decoder.finish()?;
                    return Some((Ok(frame), state));
                }
            }
        }
    })
}
