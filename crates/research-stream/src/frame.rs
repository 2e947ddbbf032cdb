use crate::errors::FramingError;

/// Default cap on the incomplete tail kept between pushes (1 MiB).
pub const DEFAULT_MAX_BUFFERED_BYTES: usize = 1024 * 1024;

/// One delimiter-bounded unit of the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    text: String,
}

impl Frame {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Raw frame text without the trailing blank-line delimiter.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Iterates the frame's lines, tolerating CRLF line endings.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n').map(|line| line.trim_end_matches('\r'))
    }
}

/// Turns a growing text buffer into complete frames.
///
/// Frames are separated by a blank line (`\n\n`, or `\r\n\r\n`). The segment
/// after the last delimiter is kept until a later push completes it, so chunk
/// boundaries never have to line up with frame boundaries.
#[derive(Debug)]
pub struct FrameSplitter {
    buf: String,
    max_buffered_bytes: Option<usize>,
    discarding: bool,
    /// Prefix of `buf` already searched without finding a delimiter.
    scanned: usize,
}

impl Default for FrameSplitter {
    fn default() -> Self {
        Self::new(Some(DEFAULT_MAX_BUFFERED_BYTES))
    }
}

impl FrameSplitter {
    /// Creates a splitter. `None` disables the buffer backstop.
    pub fn new(max_buffered_bytes: Option<usize>) -> Self {
        Self {
            buf: String::new(),
            max_buffered_bytes,
            discarding: false,
            scanned: 0,
        }
    }

    /// Creates a splitter without any bound on buffered bytes.
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Number of bytes currently held in the incomplete tail.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Appends `text` and returns every frame completed by it, in order.
    ///
    /// Framing errors are yielded in the position where they occurred so the
    /// caller can log them and carry on with the frames around them.
    pub fn push(&mut self, text: &str) -> Vec<Result<Frame, FramingError>> {
        self.buf.push_str(text);
        let mut out = Vec::new();
        // A delimiter may straddle the old end of the buffer.
        let mut from = self.scanned.saturating_sub(3);

        if self.discarding {
            match find_frame_delimiter(&self.buf, from) {
                Some((idx, delim_len)) => {
                    self.buf.drain(..idx + delim_len);
                    self.discarding = false;
                    from = 0;
                }
                None => {
                    // Keep a few bytes in case the delimiter straddles pushes.
                    let mut cut = self.buf.len().saturating_sub(3);
                    while !self.buf.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    self.buf.drain(..cut);
                    self.scanned = self.buf.len();
                    return out;
                }
            }
        }

        let mut consumed = 0;
        while let Some((idx, delim_len)) = find_frame_delimiter(&self.buf, from) {
            let frame_text = &self.buf[consumed..idx];
            consumed = idx + delim_len;
            from = consumed;
            if frame_text.trim().is_empty() {
                continue;
            }
            match self.max_buffered_bytes {
                Some(limit) if frame_text.len() > limit => {
                    out.push(Err(FramingError::OversizedFrame {
                        limit,
                        size: frame_text.len(),
                    }));
                }
                _ => out.push(Ok(Frame::new(frame_text))),
            }
        }
        self.buf.drain(..consumed);
        self.scanned = self.buf.len();

        if let Some(limit) = self.max_buffered_bytes
            && self.buf.len() > limit
        {
            let buffered = self.buf.len();
            self.buf.clear();
            self.scanned = 0;
            self.discarding = true;
            out.push(Err(FramingError::BufferOverflow { limit, buffered }));
        }
        out
    }

    /// Consumes the splitter and returns whatever incomplete tail remains.
    ///
    /// The tail is never emitted as a frame: a source that closes mid-frame
    /// has not delivered that frame.
    pub fn finish(self) -> String {
        self.buf
    }
}

/// Finds the first delimiter starting at or after byte `from`.
fn find_frame_delimiter(buf: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = buf.as_bytes();
    let mut i = from;
    while i + 1 < bytes.len() {
        if bytes[i] == b'\n' && bytes[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < bytes.len()
            && bytes[i] == b'\r'
            && bytes[i + 1] == b'\n'
            && bytes[i + 2] == b'\r'
            && bytes[i + 3] == b'\n'
        {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}
