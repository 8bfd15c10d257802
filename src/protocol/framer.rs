//! Byte framer for the modem receive stream.
//!
//! Bytes arrive one at a time (or in small chunks) from the serial reader and
//! are appended to a bounded buffer. The framer answers two questions about
//! that buffer without ever blocking:
//!
//! - has one of a set of terminator tokens arrived (`is_terminated`)
//! - has a complete `+IPD,<id>,<len>:` binary frame arrived (`is_frame_ready`)
//!
//! Bytes beyond the capacity are dropped and the buffer is marked truncated.

use bytes::{BufMut, BytesMut};

use crate::core::{Error, Result, RECEIVE_CAPACITY};
use super::{IPD_PREFIX, LINE_ERROR, LINE_FAIL, LINE_OK, TOKEN_SEND_OK};

/// Suffixes that raise the ready flag as soon as their last byte lands
const READY_SUFFIXES: [&str; 4] = [LINE_OK, LINE_ERROR, LINE_FAIL, TOKEN_SEND_OK];

/// Longest header text accepted between the frame prefix and its colon
const MAX_HEADER_LEN: usize = 16;

/// Snapshot of the framer published to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseEvent<'a> {
    /// A terminator or a complete frame has been seen since the last clear
    pub ready: bool,
    /// Buffered bytes at the time of the snapshot
    pub buffer: &'a [u8],
}

/// Parsed frame header located in the receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    /// Offset of the prefix
    pub start: usize,
    /// Link id, absent in single-link mode
    pub link_id: Option<u8>,
    /// Declared payload length
    pub len: usize,
    /// Offset of the first payload byte
    pub data_start: usize,
}

impl FrameHeader {
    /// Offset one past the last payload byte
    pub fn end(&self) -> usize {
        self.data_start + self.len
    }
}

/// Accumulates received bytes and detects response boundaries
#[derive(Debug)]
pub struct Framer {
    buf: BytesMut,
    capacity: usize,
    truncated: bool,
    ready: bool,
}

impl Framer {
    /// Creates a framer with the default receive capacity
    pub fn new() -> Self {
        Self::with_capacity(RECEIVE_CAPACITY)
    }

    /// Creates a framer with a custom capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Framer {
            buf: BytesMut::with_capacity(capacity),
            capacity,
            truncated: false,
            ready: false,
        }
    }

    /// Appends one byte, returns false if it was dropped for lack of room
    pub fn push(&mut self, byte: u8) -> bool {
        if self.buf.len() >= self.capacity {
            self.truncated = true;
            return false;
        }
        self.buf.put_u8(byte);
        if !self.ready && self.completes_event() {
            self.ready = true;
        }
        true
    }

    /// Appends a chunk, returns the number of bytes kept
    pub fn extend(&mut self, data: &[u8]) -> usize {
        data.iter().take_while(|&&b| self.push(b)).count()
    }

    /// Clears the buffer and every flag
    pub fn reset(&mut self) {
        self.buf.clear();
        self.truncated = false;
        self.ready = false;
    }

    /// Buffered bytes
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Largest number of bytes the buffer holds
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether bytes were dropped since the last reset
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Current event snapshot
    pub fn event(&self) -> ResponseEvent<'_> {
        ResponseEvent {
            ready: self.ready,
            buffer: &self.buf,
        }
    }

    /// Clears the ready flag, then raises it again if the remaining bytes
    /// still hold a terminator or a complete frame
    pub fn refresh_event(&mut self) {
        self.ready = READY_SUFFIXES
            .iter()
            .any(|s| find(&self.buf, s.as_bytes()).is_some())
            || self.is_frame_ready(IPD_PREFIX);
    }

    /// Index of the candidate whose first occurrence starts earliest,
    /// ties resolved in candidate order
    pub fn is_terminated(&self, candidates: &[&str]) -> Option<usize> {
        candidates
            .iter()
            .enumerate()
            .filter_map(|(i, c)| find(&self.buf, c.as_bytes()).map(|pos| (pos, i)))
            .min()
            .map(|(_, i)| i)
    }

    /// Whether `token` occurs before the first frame marker (or anywhere if
    /// no marker is buffered), so payload bytes never match
    pub fn contains_outside_frames(&self, token: &str, marker_prefix: &str) -> bool {
        let limit = find(&self.buf, marker_prefix.as_bytes()).unwrap_or(self.buf.len());
        find(&self.buf[..limit], token.as_bytes()).is_some()
    }

    /// Whether a complete frame announced with `marker_prefix` is buffered
    pub fn is_frame_ready(&self, marker_prefix: &str) -> bool {
        matches!(
            locate_frame(&self.buf, marker_prefix),
            Ok(Some(header)) if self.buf.len() >= header.end()
        )
    }

    fn completes_event(&self) -> bool {
        READY_SUFFIXES
            .iter()
            .any(|s| self.buf.ends_with(s.as_bytes()))
            || self.is_frame_ready(IPD_PREFIX)
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

/// Position of the first occurrence of `needle` in `haystack`
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Locates and parses the first frame header in `buf`.
///
/// Returns `Ok(None)` while no marker or only part of its header has arrived,
/// and `FrameMalformed` once the header text cannot be a non-negative length.
pub(crate) fn locate_frame(buf: &[u8], marker_prefix: &str) -> Result<Option<FrameHeader>> {
    let start = match find(buf, marker_prefix.as_bytes()) {
        Some(pos) => pos,
        None => return Ok(None),
    };
    let header_start = start + marker_prefix.len();
    let rest = &buf[header_start..];

    let colon = match rest.iter().position(|&b| b == b':') {
        Some(pos) => pos,
        None => {
            // Header still arriving; reject early only if it cannot become valid
            if rest.len() > MAX_HEADER_LEN || rest.iter().any(|&b| !(b.is_ascii_digit() || b == b',')) {
                return Err(Error::frame_malformed(format!(
                    "bad frame header {:?}",
                    String::from_utf8_lossy(rest)
                )));
            }
            return Ok(None);
        }
    };

    let header = std::str::from_utf8(&rest[..colon])
        .map_err(|_| Error::frame_malformed("frame header is not text"))?;
    if header.len() > MAX_HEADER_LEN {
        return Err(Error::frame_malformed(format!("frame header too long: {:?}", header)));
    }

    let mut fields = header.split(',');
    let (link_id, len_text) = match (fields.next(), fields.next(), fields.next()) {
        (Some(len), None, None) => (None, len),
        (Some(id), Some(len), None) => {
            let id = id
                .parse::<u8>()
                .map_err(|_| Error::frame_malformed(format!("bad link id {:?}", id)))?;
            (Some(id), len)
        }
        _ => return Err(Error::frame_malformed(format!("bad frame header {:?}", header))),
    };
    let len = len_text
        .parse::<usize>()
        .map_err(|_| Error::frame_malformed(format!("bad frame length {:?}", len_text)))?;

    Ok(Some(FrameHeader {
        start,
        link_id,
        len,
        data_start: header_start + colon + 1,
    }))
}
