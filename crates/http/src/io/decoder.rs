use std::collections::VecDeque;
use std::mem;
use std::str;

use omnidocs_protocol::Frame;

use super::{BodyError, Chunks};

/// Every event line starts with this prefix, followed by a JSON object.
const DATA_PREFIX: &str = "data: ";

/// Incremental decoder for the `data: <json>\n` framing.
///
/// Bytes go in as they arrive, in blocks of any size; a frame comes out
/// once its line is complete. The decoder never looks at a line twice, so
/// the cost of feeding a block is proportional to the block plus the
/// incomplete line carried over from the previous one.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    // Decoded text that doesn't end with a line feed yet.
    buf: String,
    // Length of the prefix of `buf` already searched for a line feed.
    scanned: usize,
    // Trailing bytes of an incomplete UTF-8 sequence.
    undecoded: Vec<u8>,
}

impl FrameDecoder {
    /// Feeds a block of bytes and returns the frames completed by it, in
    /// order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.push_bytes(bytes);

        let mut frames = Vec::new();
        let mut consumed = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.buf[search_from..].find('\n') {
            let eol_idx = search_from + offset;
            if let Some(frame) = parse_line(&self.buf[consumed..eol_idx]) {
                frames.push(frame);
            }
            consumed = eol_idx + 1;
            search_from = consumed;
        }
        self.buf.drain(..consumed);
        self.scanned = self.buf.len();

        frames
    }

    /// Flushes the decoder after the byte stream ended.
    ///
    /// The leftover is emitted only if it is a complete event line that
    /// just lacks the final line feed. Anything else is a truncated tail
    /// and is discarded silently.
    pub fn finish(&mut self) -> Option<Frame> {
        let undecoded = mem::take(&mut self.undecoded);
        let mut rest = mem::take(&mut self.buf);
        self.scanned = 0;
        rest.push_str(&String::from_utf8_lossy(&undecoded));

        let line = rest.strip_suffix('\r').unwrap_or(rest.as_str());
        let payload = line.strip_prefix(DATA_PREFIX)?;
        match serde_json::from_str(payload) {
            Ok(frame) => Some(frame),
            Err(_) => {
                trace!("discarding incomplete trailing data: {line:?}");
                None
            }
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.undecoded.extend_from_slice(bytes);

        let mut start = 0;
        loop {
            match str::from_utf8(&self.undecoded[start..]) {
                Ok(s) => {
                    self.buf.push_str(s);
                    start = self.undecoded.len();
                    break;
                }
                Err(err) => {
                    let valid_end = start + err.valid_up_to();
                    self.buf.push_str(&String::from_utf8_lossy(
                        &self.undecoded[start..valid_end],
                    ));
                    match err.error_len() {
                        // An invalid sequence in the middle of the data.
                        Some(len) => {
                            self.buf.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        // A sequence cut off by the block boundary, wait
                        // for the rest of it.
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.undecoded.drain(..start);
    }
}

fn parse_line(line: &str) -> Option<Frame> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    // Blank separators, comments and other fields carry no frame.
    let payload = line.strip_prefix(DATA_PREFIX)?;
    match serde_json::from_str(payload) {
        Ok(frame) => Some(frame),
        Err(err) => {
            warn!("dropping malformed frame ({err}): {payload:?}");
            None
        }
    }
}

/// A type for reading frames from a chunk stream.
///
/// It suspends once per chunk of bytes, not once per frame; all frames
/// decoded from one chunk are queued and handed out without waiting.
pub struct FrameReader {
    chunks: Chunks,
    decoder: FrameDecoder,
    pending: VecDeque<Frame>,
    finished: bool,
}

impl FrameReader {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            chunks,
            decoder: FrameDecoder::default(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    pub async fn next_frame(&mut self) -> Result<Option<Frame>, BodyError> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            if self.finished {
                return Ok(None);
            }

            match self.chunks.next_chunk().await? {
                Some(bytes) => {
                    trace!("received {} bytes", bytes.len());
                    self.pending.extend(self.decoder.feed(&bytes));
                }
                None => {
                    self.finished = true;
                    self.pending.extend(self.decoder.finish());
                }
            }
        }
    }
}
