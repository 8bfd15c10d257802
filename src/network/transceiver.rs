//! Command/response exchanges with the modem.
//!
//! Every exchange starts by resetting the framer and discarding anything the
//! receiver queued earlier, so a terminator left over from a previous command
//! can never complete the next one. Waits are a single deadline-bounded await
//! on the receive channel; the transceiver wakes as soon as bytes arrive.

use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};

use crate::core::{Error, Result};
use crate::protocol::{AtCommand, Expect, Framer};
use super::serial::{channel_closed, RxConsumer, SerialLink};

/// Drives one command exchange at a time over a serial link
pub struct Transceiver<L> {
    link: L,
    rx: RxConsumer,
    framer: Framer,
}

impl<L: SerialLink> Transceiver<L> {
    /// Creates a transceiver from a link and the consumer side of its receive channel
    pub fn new(link: L, rx: RxConsumer) -> Self {
        Self::with_framer(link, rx, Framer::new())
    }

    /// Creates a transceiver with a custom framer
    pub fn with_framer(link: L, rx: RxConsumer, framer: Framer) -> Self {
        Transceiver { link, rx, framer }
    }

    /// Clears the framer and drops bytes queued by the receiver
    pub fn reset(&mut self) {
        while self.rx.try_recv().is_ok() {}
        self.framer.reset();
    }

    /// Writes raw bytes to the modem
    pub fn transmit(&mut self, data: &[u8]) -> Result<()> {
        self.link.transmit(data)
    }

    /// Sends `command` verbatim and waits for the outcome.
    ///
    /// An empty command skips the reset and the transmission and only waits,
    /// for exchanges where an earlier step already triggered the response.
    pub async fn send_and_wait(
        &mut self,
        command: &str,
        expect: Expect,
        timeout: Duration,
    ) -> Result<()> {
        if !command.is_empty() {
            self.reset();
            trace!(command = command.trim_end(), "sending command");
            self.transmit(command.as_bytes())?;
        }
        self.wait_for(expect, timeout).await
    }

    /// Sends a typed command and waits for the outcome
    pub async fn send_command(
        &mut self,
        command: &AtCommand,
        expect: Expect,
        timeout: Duration,
    ) -> Result<()> {
        debug!(%command, "modem command");
        self.send_and_wait(&command.to_line(), expect, timeout).await
    }

    /// Sends raw payload bytes and waits for the outcome
    pub async fn send_bytes_and_wait(
        &mut self,
        data: &[u8],
        expect: Expect,
        timeout: Duration,
    ) -> Result<()> {
        self.reset();
        trace!(len = data.len(), "sending payload");
        self.transmit(data)?;
        self.wait_for(expect, timeout).await
    }

    /// Waits until the expected token, an error token or the deadline.
    ///
    /// Status tokens only count as whole lines, so the modem's echo of the
    /// command never ends the exchange. The earliest token in the buffer
    /// decides the outcome.
    pub async fn wait_for(&mut self, expect: Expect, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let candidates = expect.candidates();
        let mut warned = false;

        loop {
            self.drain_pending();

            match self.framer.is_terminated(&candidates) {
                Some(0) => {
                    trace!(token = expect.token(), "exchange complete");
                    return Ok(());
                }
                Some(i) => {
                    let token = candidates[i].trim();
                    debug!(token, expected = expect.token(), "modem reported failure");
                    return Err(Error::transport_protocol(format!(
                        "{} while waiting for {}",
                        token,
                        expect.token()
                    )));
                }
                None => {}
            }

            if self.framer.truncated() && !warned {
                warn!(capacity = self.framer.capacity(), "receive buffer full, dropping bytes");
                warned = true;
            }

            if !self.fill_until(deadline).await? {
                debug!(expected = expect.token(), ?timeout, "exchange timed out");
                return Err(Error::transport_timeout(expect.token()));
            }
        }
    }

    /// Moves every chunk already queued by the receiver into the framer
    pub(crate) fn drain_pending(&mut self) {
        while let Ok(chunk) = self.rx.try_recv() {
            self.framer.extend(&chunk);
        }
    }

    /// Waits for the next chunk, false once the deadline passes
    pub(crate) async fn fill_until(&mut self, deadline: Instant) -> Result<bool> {
        match timeout_at(deadline, self.rx.recv()).await {
            Ok(Some(chunk)) => {
                self.framer.extend(&chunk);
                Ok(true)
            }
            Ok(None) => Err(channel_closed()),
            Err(_) => Ok(false),
        }
    }

    /// Framer holding the bytes of the current exchange
    pub fn framer(&self) -> &Framer {
        &self.framer
    }

    pub(crate) fn framer_mut(&mut self) -> &mut Framer {
        &mut self.framer
    }

    /// Underlying link
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Underlying link, mutably
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}
