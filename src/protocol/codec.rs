use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{Error, NetworkEndpoint, RECEIVE_CAPACITY};
use super::framer::{find, locate_frame};
use super::IPD_PREFIX;

/// Modem commands used by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtCommand {
    /// Liveness probe
    Probe,
    /// Station (client) mode
    StationMode,
    /// Enable or disable multiple links
    Multiplex(bool),
    /// Normal (non pass-through) transfer mode
    NormalTransfer,
    /// Leave the current access point
    QuitAp,
    /// Join an access point
    JoinAp {
        ssid: String,
        password: String,
    },
    /// Open a UDP channel on a link slot
    OpenUdp {
        link_id: u8,
        endpoint: NetworkEndpoint,
    },
    /// Open a single-link TCP connection
    OpenTcp {
        endpoint: NetworkEndpoint,
    },
    /// Announce a payload of `len` bytes, on a link slot in multi-link mode
    SendSize {
        link_id: Option<u8>,
        len: usize,
    },
    /// Close a link slot
    Close {
        link_id: u8,
    },
    /// Query link status
    Status,
}

/// Escapes the characters the modem treats specially inside quoted arguments
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | ',' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for AtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtCommand::Probe => write!(f, "AT"),
            AtCommand::StationMode => write!(f, "AT+CWMODE=1"),
            AtCommand::Multiplex(on) => write!(f, "AT+CIPMUX={}", u8::from(*on)),
            AtCommand::NormalTransfer => write!(f, "AT+CIPMODE=0"),
            AtCommand::QuitAp => write!(f, "AT+CWQAP"),
            AtCommand::JoinAp { ssid, password } => {
                write!(f, "AT+CWJAP=\"{}\",\"{}\"", escape(ssid), escape(password))
            }
            AtCommand::OpenUdp { link_id, endpoint } => write!(
                f,
                "AT+CIPSTART={},\"UDP\",\"{}\",{}",
                link_id, endpoint.host, endpoint.port
            ),
            AtCommand::OpenTcp { endpoint } => write!(
                f,
                "AT+CIPSTART=\"TCP\",\"{}\",{}",
                endpoint.host, endpoint.port
            ),
            AtCommand::SendSize { link_id: Some(id), len } => {
                write!(f, "AT+CIPSEND={},{}", id, len)
            }
            AtCommand::SendSize { link_id: None, len } => write!(f, "AT+CIPSEND={}", len),
            AtCommand::Close { link_id } => write!(f, "AT+CIPCLOSE={}", link_id),
            AtCommand::Status => write!(f, "AT+CIPSTATUS"),
        }
    }
}

impl AtCommand {
    /// Command text with its CRLF terminator
    pub fn to_line(&self) -> String {
        format!("{}\r\n", self)
    }
}

/// Encodes commands as CRLF-terminated lines
#[derive(Clone, Default)]
pub struct AtCodec;

impl AtCodec {
    /// Creates a new command codec
    pub fn new() -> Self {
        AtCodec
    }
}

impl Encoder<AtCommand> for AtCodec {
    type Error = Error;

    fn encode(&mut self, item: AtCommand, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.to_line();
        dst.reserve(line.len());
        dst.put_slice(line.as_bytes());
        Ok(())
    }
}

/// Binary payload sliced out of the text stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpdFrame {
    /// Link the payload arrived on, absent in single-link mode
    pub link_id: Option<u8>,
    /// Exactly the declared number of payload bytes
    pub payload: Bytes,
}

/// Decodes `<prefix>[<id>,]<len>:<payload>` frames embedded in modem output.
///
/// A decoded frame is split off the front of the buffer together with
/// everything before it, so the next scan starts at the first unconsumed
/// byte and never sees the same marker twice.
///
/// The codec also keeps a bounded buffer from wedging: a frame whose marker
/// and payload cannot fit in `capacity` bytes is dropped as malformed, and
/// text ahead of the marker is discarded once the frame needs the room.
#[derive(Debug, Clone)]
pub struct IpdCodec {
    prefix: String,
    capacity: usize,
}

impl IpdCodec {
    /// Creates a codec for the standard `+IPD,` marker
    pub fn new() -> Self {
        Self::with_prefix(IPD_PREFIX)
    }

    /// Creates a codec for a custom marker prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        IpdCodec {
            prefix: prefix.into(),
            capacity: RECEIVE_CAPACITY,
        }
    }

    /// Sets the size of the buffer frames are decoded from
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

impl IpdCodec {
    /// Drops buffered text that holds no complete marker, keeping the partial
    /// marker or header at its end
    fn discard_text(&self, src: &mut BytesMut) {
        let keep_from = match find(src, self.prefix.as_bytes()) {
            Some(pos) => pos,
            None => src.len().saturating_sub(self.prefix.len().saturating_sub(1)),
        };
        src.advance(keep_from);
    }
}

impl Default for IpdCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for IpdCodec {
    type Item = IpdFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match locate_frame(src, &self.prefix) {
            Ok(Some(header)) => header,
            Ok(None) => {
                if src.len() >= self.capacity {
                    self.discard_text(src);
                }
                return Ok(None);
            }
            Err(e) => {
                // Drop the bad marker so the next scan can resynchronize
                if let Some(pos) = find(src, self.prefix.as_bytes()) {
                    src.advance(pos + self.prefix.len());
                }
                return Err(e);
            }
        };

        let span = header.end() - header.start;
        if span > self.capacity {
            src.advance(header.end().min(src.len()));
            return Err(Error::frame_malformed(format!(
                "frame of {} bytes exceeds capacity {}",
                span, self.capacity
            )));
        }

        if src.len() < header.end() {
            if header.end() > self.capacity {
                src.advance(header.start);
            }
            return Ok(None);
        }

        src.advance(header.data_start);
        let payload = src.split_to(header.len).freeze();

        Ok(Some(IpdFrame {
            link_id: header.link_id,
            payload,
        }))
    }
}
