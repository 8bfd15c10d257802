//! Byte-stream transport over the modem for an external protocol client.
//!
//! `send` wraps a payload in the send-size, prompt, payload, confirm
//! sequence. `recv` hands out frame payloads in whatever slice sizes the
//! client asks for, keeping the unread tail of the last frame for the next
//! call.

use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use crate::core::{Error, Result, Timeouts, RECEIVE_CAPACITY};
use crate::protocol::{AtCommand, Expect, IPD_PREFIX, TOKEN_STATUS_CONNECTED};
use super::serial::SerialLink;
use super::transceiver::Transceiver;

/// Largest payload the modem accepts in one send
pub const MAX_SEND_LEN: usize = 2048;

/// Stream transport contract expected by protocol clients
#[allow(async_fn_in_trait)]
pub trait StreamTransport {
    /// Sends all of `data`, returning the number of bytes sent
    async fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Receives up to `buf.len()` bytes; 0 means the peer closed the link or
    /// nothing arrived in time
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Transport shim borrowing the modem's transceiver
pub struct TransportShim<'a, L> {
    transceiver: &'a mut Transceiver<L>,
    carry: BytesMut,
    link_id: Option<u8>,
    check_link: bool,
    timeouts: Timeouts,
}

impl<'a, L: SerialLink> TransportShim<'a, L> {
    /// Creates a shim for a single-link connection (`link_id` None) or a link slot
    pub fn new(transceiver: &'a mut Transceiver<L>, link_id: Option<u8>, timeouts: &Timeouts) -> Self {
        TransportShim {
            transceiver,
            carry: BytesMut::with_capacity(RECEIVE_CAPACITY),
            link_id,
            check_link: false,
            timeouts: timeouts.clone(),
        }
    }

    /// Queries the link status before every send
    pub fn with_link_check(mut self, enabled: bool) -> Self {
        self.check_link = enabled;
        self
    }

    /// Received bytes not yet handed out
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    async fn ensure_link_up(&mut self) -> Result<()> {
        self.transceiver
            .send_command(&AtCommand::Status, Expect::Ok, self.timeouts.prompt)
            .await?;
        let framer = self.transceiver.framer();
        if !framer.contains_outside_frames(TOKEN_STATUS_CONNECTED, IPD_PREFIX) {
            warn!("connection not established");
            return Err(Error::transport_protocol("connection not established"));
        }
        Ok(())
    }

    /// Moves frames that already arrived into the carry buffer. Called before
    /// every exchange of a send, since each one resets the framer.
    fn stash_frames(&mut self) {
        loop {
            match self.transceiver.try_extract_frame(IPD_PREFIX) {
                Ok(Some(frame)) => {
                    let room = RECEIVE_CAPACITY.saturating_sub(self.carry.len());
                    if frame.payload.len() > room {
                        warn!(len = frame.payload.len(), "carry buffer full, dropping frame");
                        continue;
                    }
                    self.carry.extend_from_slice(&frame.payload);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "discarding unreadable frame");
                    break;
                }
            }
        }
    }

    fn take_carry(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.carry.len());
        buf[..n].copy_from_slice(&self.carry[..n]);
        self.carry.advance(n);
        n
    }
}

impl<L: SerialLink> StreamTransport for TransportShim<'_, L> {
    async fn send(&mut self, data: &[u8]) -> Result<usize> {
        if data.is_empty() || data.len() > MAX_SEND_LEN {
            return Err(Error::invalid_param(format!(
                "send length {} outside 1..={}",
                data.len(),
                MAX_SEND_LEN
            )));
        }

        self.stash_frames();
        if self.check_link {
            self.ensure_link_up().await?;
            self.stash_frames();
        }

        let announce = AtCommand::SendSize {
            link_id: self.link_id,
            len: data.len(),
        };
        self.transceiver
            .send_command(&announce, Expect::Prompt, self.timeouts.prompt)
            .await?;
        self.stash_frames();
        self.transceiver
            .send_bytes_and_wait(data, Expect::SendOk, self.timeouts.confirm)
            .await?;

        trace!(len = data.len(), "payload sent");
        Ok(data.len())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.carry.is_empty() {
            return Ok(self.take_carry(buf));
        }

        let frame = match self
            .transceiver
            .extract_frame(IPD_PREFIX, self.timeouts.recv)
            .await
        {
            Ok(frame) => frame,
            Err(Error::PeerClosed) => {
                debug!("connection closed by peer");
                self.transceiver.reset();
                return Ok(0);
            }
            Err(Error::FrameTimeout) => {
                trace!("no data received");
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        self.carry.extend_from_slice(&frame.payload);
        Ok(self.take_carry(buf))
    }
}
